//! Entry point for task submission

use dps_common::types::Task;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::context::SubmitContext;
use crate::error::{Result, SubmitError};
use crate::status::{TaskStatusChecker, TaskStatusUpdater};
use crate::submitters::TaskSubmitterSelector;
use crate::topics::TopicSelector;

/// One submission of a task to a topology
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub task: Task,
    pub topology_name: String,
    /// Re-dispatch records an earlier run already sent
    pub restart: bool,
}

impl SubmitRequest {
    pub fn new(task: Task, topology_name: impl Into<String>) -> Self {
        Self {
            task,
            topology_name: topology_name.into(),
            restart: false,
        }
    }

    pub fn with_restart(mut self, restart: bool) -> Self {
        self.restart = restart;
        self
    }
}

/// Routes tasks to their topology's submitter and owns the outcome.
///
/// Configuration errors (unknown topology, no topic) are recorded on the
/// task and returned. Failures during resolution only drop the task; a kill
/// keeps the counted size and a shutdown is returned to the caller.
pub struct SubmitTaskService {
    selector: TaskSubmitterSelector,
    topics: Arc<dyn TopicSelector>,
    checker: Arc<TaskStatusChecker>,
    updater: TaskStatusUpdater,
}

impl SubmitTaskService {
    pub fn new(
        selector: TaskSubmitterSelector,
        topics: Arc<dyn TopicSelector>,
        checker: Arc<TaskStatusChecker>,
        updater: TaskStatusUpdater,
    ) -> Self {
        Self {
            selector,
            topics,
            checker,
            updater,
        }
    }

    #[instrument(skip_all, fields(task_id = request.task.task_id, topology = %request.topology_name))]
    pub async fn submit(&self, request: SubmitRequest) -> Result<()> {
        let ctx = SubmitContext::new(request.task, request.topology_name).with_restart(request.restart);
        let task_id = ctx.task_id();

        let submitter = match self.selector.select(ctx.topology_name()) {
            Ok(submitter) => submitter,
            Err(e) => {
                self.updater.record_rejected(&ctx, &e.to_string()).await?;
                return Err(e);
            },
        };
        let topic = match self.topics.select(ctx.topology_name()) {
            Ok(topic) => topic,
            Err(e) => {
                self.updater.record_rejected(&ctx, &e.to_string()).await?;
                return Err(e);
            },
        };

        let ctx = Arc::new(ctx.with_topic(topic));
        self.checker.forget(task_id);
        self.updater.update_submission_metadata(&ctx).await?;
        info!(topic = ctx.topic(), restart = ctx.is_restart(), "Submitting task");

        match submitter.submit(Arc::clone(&ctx)).await {
            Ok(()) => Ok(()),
            Err(SubmitError::Killed { .. }) => {
                let counted = ctx.counted();
                info!(counted, "Task was killed during submission");
                self.updater.update_expected_size(task_id, counted).await
            },
            Err(e) if e.is_interrupted() => {
                warn!("Task submission interrupted by shutdown");
                Err(e)
            },
            Err(e) => {
                error!(error = %e, "Task submission failed");
                self.updater.mark_dropped(task_id, &e.to_string()).await
            },
        }
    }
}
