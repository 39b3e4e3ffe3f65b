//! Dispatch engine
//!
//! Resolves a task's inputs into records and drives them through the
//! [`RecordSubmitService`]. Three enumeration paths exist:
//!
//! - explicit file lists, submitted in input order
//! - whole datasets, walked sequentially representation by representation
//! - tagged revisions of a dataset, paged sequentially and fanned out onto a
//!   bounded [`WorkerPool`](pool::WorkerPool) within each page
//!
//! The kill signal is polled before every page, worker slice and direct
//! submission. A kill is not a failure: the task keeps the expected size of
//! what was dispatched before the signal was seen.

use dps_common::types::{DataSetRef, DpsRecord, InputDataType, TaskState};
use dps_common::DpsError;
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::config::DispatchConfig;
use crate::context::SubmitContext;
use crate::error::{Result, SubmitError};
use crate::ledger::RecordSubmitService;
use crate::reader::StoreReader;
use crate::status::{TaskStatusChecker, TaskStatusUpdater};

mod dataset;
pub(crate) mod pool;
mod revision;

/// State description of tasks that resolved to nothing
pub const NO_RECORDS: &str = "The task was dropped because it resolved to no records";

pub struct DispatchEngine {
    reader: StoreReader,
    submitter: Arc<RecordSubmitService>,
    checker: Arc<TaskStatusChecker>,
    updater: TaskStatusUpdater,
    settings: DispatchConfig,
}

impl DispatchEngine {
    pub fn new(
        reader: StoreReader,
        submitter: Arc<RecordSubmitService>,
        checker: Arc<TaskStatusChecker>,
        updater: TaskStatusUpdater,
    ) -> Self {
        Self {
            reader,
            submitter,
            checker,
            updater,
            settings: DispatchConfig::default(),
        }
    }

    pub fn with_settings(mut self, settings: DispatchConfig) -> Self {
        self.settings = settings;
        self
    }

    /// Resolve and submit every record of the task, then record the outcome.
    ///
    /// Only `Interrupted` (and failures to persist the outcome) escape. A kill
    /// keeps the counted size, any other failure drops the task with the
    /// error as its description.
    #[instrument(skip_all, fields(task_id = ctx.task_id(), topology = ctx.topology_name()))]
    pub async fn dispatch(&self, ctx: Arc<SubmitContext>) -> Result<()> {
        let task_id = ctx.task_id();

        match self.resolve(&ctx).await {
            Ok(0) => self.updater.mark_dropped(task_id, NO_RECORDS).await,
            Ok(total) => {
                ctx.set_expected_size(total);
                info!(total, "Task resolved");
                self.updater
                    .update_state_and_expected_size(task_id, TaskState::Queued, total)
                    .await
            },
            Err(SubmitError::Killed { .. }) => {
                let counted = ctx.counted();
                info!(counted, "Task was killed, keeping what was dispatched so far");
                ctx.set_expected_size(counted);
                self.updater.update_expected_size(task_id, counted).await
            },
            Err(e) if e.is_interrupted() => Err(e),
            Err(e) => {
                error!(error = %e, "Task resolution failed");
                self.updater.mark_dropped(task_id, &e.to_string()).await
            },
        }
    }

    async fn resolve(&self, ctx: &Arc<SubmitContext>) -> Result<u64> {
        self.checker.ensure_running(ctx.task_id()).await?;

        match ctx.task().input_kind() {
            Some(InputDataType::FileUrls) => self.submit_files(ctx).await,
            Some(InputDataType::DatasetUrls) => self.submit_datasets(ctx).await,
            Some(InputDataType::RepositoryUrls) | None => Err(DpsError::InvalidTask(
                "expected a file list or a dataset list".to_string(),
            )
            .into()),
        }
    }

    async fn submit_files(&self, ctx: &Arc<SubmitContext>) -> Result<u64> {
        let task = ctx.task();
        let mut counted = 0;

        for url in task.entries(InputDataType::FileUrls) {
            self.checker.ensure_running(task.task_id).await?;
            let record = DpsRecord::new(task.task_id, url).with_metadata_prefix(task.schema_name());
            if self.submitter.submit(&record, ctx).await? {
                counted += 1;
            }
        }

        Ok(counted)
    }

    async fn submit_datasets(&self, ctx: &Arc<SubmitContext>) -> Result<u64> {
        let revision = ctx.task().revision_selector()?;
        let mut total = 0;

        for url in ctx.task().dataset_urls() {
            let dataset = DataSetRef::parse(url)?;
            total += match &revision {
                Some(revision) => self.scan_revision(ctx, &dataset, revision).await?,
                None => self.scan_dataset(ctx, &dataset).await?,
            };
        }

        Ok(total)
    }
}
