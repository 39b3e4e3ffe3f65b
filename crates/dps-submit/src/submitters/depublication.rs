use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dps_common::types::{params, DpsRecord, Task, TaskState};
use dps_common::DpsError;
use std::sync::Arc;
use tracing::info;

use super::TaskSubmitter;
use crate::context::SubmitContext;
use crate::engine::NO_RECORDS;
use crate::error::Result;
use crate::ledger::RecordSubmitService;
use crate::status::{TaskStatusChecker, TaskStatusUpdater};

/// Lists the published records of a dataset
#[async_trait]
pub trait RecordIndex: Send + Sync {
    async fn record_ids(&self, dataset_id: &str, as_of: DateTime<Utc>) -> Result<Vec<String>>;
}

/// Submits the records to withdraw from publication. They are either listed
/// explicitly on the task or looked up in the [`RecordIndex`].
pub struct DepublicationSubmitter {
    index: Option<Arc<dyn RecordIndex>>,
    submitter: Arc<RecordSubmitService>,
    checker: Arc<TaskStatusChecker>,
    updater: TaskStatusUpdater,
}

impl DepublicationSubmitter {
    pub fn new(
        submitter: Arc<RecordSubmitService>,
        checker: Arc<TaskStatusChecker>,
        updater: TaskStatusUpdater,
    ) -> Self {
        Self {
            index: None,
            submitter,
            checker,
            updater,
        }
    }

    pub fn with_index(mut self, index: Arc<dyn RecordIndex>) -> Self {
        self.index = Some(index);
        self
    }

    async fn record_ids(&self, ctx: &SubmitContext) -> Result<Vec<String>> {
        let task = ctx.task();
        if let Some(ids) = explicit_record_ids(task) {
            return Ok(ids);
        }

        let dataset_id = task.parameter(params::METIS_DATASET_ID).ok_or_else(|| {
            DpsError::InvalidTask(format!(
                "either {} or {} is required",
                params::RECORD_IDS_TO_DEPUBLISH,
                params::METIS_DATASET_ID
            ))
        })?;
        let index = self.index.as_ref().ok_or_else(|| {
            DpsError::InvalidTask("no record index is configured for dataset depublication".to_string())
        })?;
        index.record_ids(dataset_id, ctx.run_start()).await
    }
}

fn explicit_record_ids(task: &Task) -> Option<Vec<String>> {
    let ids: Vec<String> = task
        .parameter(params::RECORD_IDS_TO_DEPUBLISH)?
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();
    (!ids.is_empty()).then_some(ids)
}

#[async_trait]
impl TaskSubmitter for DepublicationSubmitter {
    async fn submit(&self, ctx: Arc<SubmitContext>) -> Result<()> {
        let task_id = ctx.task_id();
        self.checker.ensure_running(task_id).await?;

        let ids = self.record_ids(&ctx).await?;
        if ids.is_empty() {
            return self.updater.mark_dropped(task_id, NO_RECORDS).await;
        }
        info!(task_id, records = ids.len(), "Depublishing records");
        ctx.set_expected_size(ids.len() as u64);
        self.updater.update_expected_size(task_id, ids.len() as u64).await?;

        let mut counted = 0;
        for id in ids {
            self.checker.ensure_running(task_id).await?;
            let record = DpsRecord::new(task_id, id);
            if self.submitter.submit(&record, &ctx).await? {
                counted += 1;
            }
        }

        ctx.set_expected_size(counted);
        if counted == 0 {
            self.updater.mark_dropped(task_id, NO_RECORDS).await
        } else {
            self.updater
                .update_state_and_expected_size(task_id, TaskState::Queued, counted)
                .await
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_ids_are_trimmed() {
        let task = Task::new(1, "depublish").with_parameter(params::RECORD_IDS_TO_DEPUBLISH, " a, b ,,c ");
        assert_eq!(
            explicit_record_ids(&task),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
    }

    #[test]
    fn test_blank_ids_fall_back_to_index() {
        let task = Task::new(1, "depublish").with_parameter(params::RECORD_IDS_TO_DEPUBLISH, " , ");
        assert_eq!(explicit_record_ids(&task), None);
    }
}
