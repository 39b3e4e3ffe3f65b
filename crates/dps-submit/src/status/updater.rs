use chrono::Utc;
use dps_common::types::TaskState;
use std::sync::Arc;
use tracing::{info, warn};

use super::{TaskInfo, TaskInfoStore};
use crate::context::SubmitContext;
use crate::error::Result;

/// Writes task lifecycle transitions to the task metadata store
#[derive(Clone)]
pub struct TaskStatusUpdater {
    store: Arc<dyn TaskInfoStore>,
}

impl TaskStatusUpdater {
    pub fn new(store: Arc<dyn TaskInfoStore>) -> Self {
        Self { store }
    }

    /// Persist the task as *resolving* along with its topic and run start
    pub async fn update_submission_metadata(&self, ctx: &SubmitContext) -> Result<()> {
        let mut info = TaskInfo::new(ctx.task_id(), ctx.topology_name(), TaskState::Resolving);
        info.state_description = "Task accepted, resolving records".to_string();
        info.topic_name = Some(ctx.topic().to_string());
        info.start_timestamp = Some(ctx.run_start());
        info.sent_timestamp = Utc::now();
        info.expected_size = ctx.expected_size();
        info.task_definition = serde_json::to_value(ctx.task()).ok();

        self.store.upsert(&info).await?;
        Ok(())
    }

    /// Record a task that was refused before any resolution started
    pub async fn record_rejected(&self, ctx: &SubmitContext, reason: &str) -> Result<()> {
        warn!(task_id = ctx.task_id(), reason, "Task rejected");
        let mut info = TaskInfo::new(ctx.task_id(), ctx.topology_name(), TaskState::Dropped);
        info.state_description = reason.to_string();
        info.task_definition = serde_json::to_value(ctx.task()).ok();

        self.store.upsert(&info).await?;
        Ok(())
    }

    pub async fn update_state(&self, task_id: i64, state: TaskState, description: &str) -> Result<()> {
        self.store.update_state(task_id, state, description).await?;
        Ok(())
    }

    pub async fn mark_dropped(&self, task_id: i64, reason: &str) -> Result<()> {
        info!(task_id, reason, "Dropping task");
        self.update_state(task_id, TaskState::Dropped, reason).await
    }

    /// Fix the expected size and move to `state`
    pub async fn update_state_and_expected_size(
        &self,
        task_id: i64,
        state: TaskState,
        expected_size: u64,
    ) -> Result<()> {
        let description = match state {
            TaskState::Queued => format!("Resolved {expected_size} record(s), waiting for processing"),
            TaskState::Sent => format!("Sent {expected_size} record(s)"),
            _ => format!("{expected_size} record(s)"),
        };
        info!(task_id, %state, expected_size, "Updating task state");
        self.store
            .update_expected_size(task_id, Some((state, &description)), expected_size)
            .await?;
        Ok(())
    }

    /// Store a new expected size without touching the state
    pub async fn update_expected_size(&self, task_id: i64, expected_size: u64) -> Result<()> {
        self.store
            .update_expected_size(task_id, None, expected_size)
            .await?;
        Ok(())
    }
}
