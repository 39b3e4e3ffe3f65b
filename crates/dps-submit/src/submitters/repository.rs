use async_trait::async_trait;
use dps_common::types::{DpsRecord, InputDataType, TaskState};
use dps_common::DpsError;
use reqwest::{Client, Url};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::archive::{self, UnpackedFile};
use super::TaskSubmitter;
use crate::config::RepositoryConfig;
use crate::context::SubmitContext;
use crate::engine::NO_RECORDS;
use crate::error::{Result, SubmitError};
use crate::ledger::RecordSubmitService;
use crate::status::{TaskStatusChecker, TaskStatusUpdater};

/// State description of restarts, which this topology cannot honour
pub const RESTART_UNSUPPORTED: &str = "Restarting repository archive tasks is not supported";

/// Downloads a repository archive, unpacks it and submits one record per file.
///
/// The archive is unpacked next to the download in `<dir>/task_<id>`, which
/// the file service publishes as `<file service>/<id>`. Records point at the
/// unpacked files, so the directory is kept once submission succeeds and is
/// only removed when the submission fails.
pub struct RepositoryArchiveSubmitter {
    client: Client,
    submitter: Arc<RecordSubmitService>,
    checker: Arc<TaskStatusChecker>,
    updater: TaskStatusUpdater,
    settings: RepositoryConfig,
}

impl RepositoryArchiveSubmitter {
    pub fn new(
        client: Client,
        submitter: Arc<RecordSubmitService>,
        checker: Arc<TaskStatusChecker>,
        updater: TaskStatusUpdater,
        settings: RepositoryConfig,
    ) -> Self {
        Self {
            client,
            submitter,
            checker,
            updater,
            settings,
        }
    }

    async fn submit_archive(&self, ctx: &Arc<SubmitContext>, url: &str, task_dir: &Path) -> Result<()> {
        let task_id = ctx.task_id();
        self.checker.ensure_running(task_id).await?;

        let archive = archive::download(&self.client, url, task_dir)
            .await
            .map_err(SubmitError::Repository)?;
        let files = archive::unpack(archive, task_dir.to_path_buf())
            .await
            .map_err(SubmitError::Repository)?;

        let estimate = files.len() as u64;
        info!(task_id, files = estimate, "Repository archive unpacked");
        ctx.set_expected_size(estimate);
        self.updater.update_expected_size(task_id, estimate).await?;

        let mut counted = 0;
        for file in &files {
            self.checker.ensure_running(task_id).await?;
            let record = DpsRecord::new(task_id, self.file_url(task_id, file)?)
                .with_metadata_prefix(ctx.task().schema_name());
            if self.submitter.submit(&record, ctx).await? {
                counted += 1;
            }
        }

        ctx.set_expected_size(counted);
        if counted == 0 {
            self.updater.mark_dropped(task_id, NO_RECORDS).await
        } else {
            self.updater
                .update_state_and_expected_size(task_id, TaskState::Sent, counted)
                .await
        }
    }

    /// Working directory of one task, served by the file service
    pub fn task_dir(&self, task_id: i64) -> PathBuf {
        self.settings.harvesting_tasks_dir.join(format!("task_{task_id}"))
    }

    /// `<file service>/<task id>/<relative path>`, percent-encoded per segment
    fn file_url(&self, task_id: i64, file: &UnpackedFile) -> Result<String> {
        let mut url = Url::parse(&self.settings.file_service_url)
            .map_err(|e| SubmitError::Repository(e.into()))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                SubmitError::Repository(anyhow::anyhow!(
                    "File service url {} cannot carry a path",
                    self.settings.file_service_url
                ))
            })?;
            segments.pop_if_empty().push(&task_id.to_string());
            for component in file.relative.components() {
                if let Component::Normal(part) = component {
                    segments.push(&part.to_string_lossy());
                }
            }
        }
        Ok(url.to_string())
    }
}

#[async_trait]
impl TaskSubmitter for RepositoryArchiveSubmitter {
    async fn submit(&self, ctx: Arc<SubmitContext>) -> Result<()> {
        let task_id = ctx.task_id();
        if ctx.is_restart() {
            return self.updater.mark_dropped(task_id, RESTART_UNSUPPORTED).await;
        }

        let url = ctx
            .task()
            .entries(InputDataType::RepositoryUrls)
            .first()
            .cloned()
            .ok_or_else(|| DpsError::InvalidTask("a repository archive url is required".to_string()))?;

        let task_dir = self.task_dir(task_id);
        // Leftovers of an earlier failed attempt would be listed as records
        remove_task_dir(task_id, &task_dir).await;

        let result = self.submit_archive(&ctx, &url, &task_dir).await;
        if result.is_err() {
            remove_task_dir(task_id, &task_dir).await;
        }
        result
    }
}

async fn remove_task_dir(task_id: i64, task_dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(task_dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(task_id, path = %task_dir.display(), error = %e, "Failed to clean up task directory");
        }
    }
}
