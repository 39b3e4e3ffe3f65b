//! Revision path: paged scan of tagged cloud ids with bounded fan-out

use dps_common::types::{CloudTagsResponse, DataSetRef, DpsRecord, Representation, RevisionSelector};
use dps_common::DpsError;
use std::sync::Arc;
use tracing::debug;

use super::pool::WorkerPool;
use super::DispatchEngine;
use crate::context::SubmitContext;
use crate::error::{Result, SubmitError};
use crate::ledger::RecordSubmitService;
use crate::reader::StoreReader;
use crate::status::TaskStatusChecker;

impl DispatchEngine {
    pub(super) async fn scan_revision(
        &self,
        ctx: &Arc<SubmitContext>,
        dataset: &DataSetRef,
        revision: &RevisionSelector,
    ) -> Result<u64> {
        let representation_name = ctx.task().representation_name().ok_or_else(|| {
            DpsError::InvalidTask("a representation name is required to scan a revision".to_string())
        })?;
        let cap = ctx.task().sample_size()?;

        let resolver = SliceResolver {
            reader: self.reader.clone(),
            submitter: Arc::clone(&self.submitter),
            checker: Arc::clone(&self.checker),
            ctx: Arc::clone(ctx),
            representation_name: Arc::from(representation_name),
            revision: Arc::new(revision.clone()),
        };

        let mut pool = WorkerPool::new(
            ctx.task_id(),
            self.settings.worker_count,
            self.settings.pool_shutdown_timeout(),
        );
        let result = self.scan_revision_pages(&mut pool, &resolver, dataset, cap).await;
        pool.shutdown().await;
        result
    }

    async fn scan_revision_pages(
        &self,
        pool: &mut WorkerPool,
        resolver: &SliceResolver,
        dataset: &DataSetRef,
        cap: Option<u64>,
    ) -> Result<u64> {
        let task_id = resolver.ctx.task_id();
        let threshold = self.settings.backpressure_threshold();
        let mut considered: u64 = 0;
        let mut outstanding: usize = 0;
        let mut total = 0;
        let mut page_token: Option<String> = None;

        loop {
            if cap.is_some_and(|cap| considered >= cap) {
                debug!(task_id, considered, "Record cap reached");
                break;
            }
            self.checker.ensure_running(task_id).await?;

            let (next_token, mut tags) = self
                .reader
                .scan_revision_tagged(
                    dataset,
                    &resolver.representation_name,
                    &resolver.revision,
                    page_token.as_deref(),
                )
                .await?;

            if let Some(cap) = cap {
                let remaining = cap.saturating_sub(considered);
                tags.truncate(usize::try_from(remaining).unwrap_or(usize::MAX));
            }
            considered += tags.len() as u64;
            outstanding += tags.len();

            if !tags.is_empty() {
                let slice_len = tags.len().div_ceil(self.settings.worker_count.max(1));
                for slice in tags.chunks(slice_len) {
                    pool.spawn(resolver.clone().resolve(slice.to_vec()));
                }
            }

            if outstanding >= threshold {
                debug!(task_id, outstanding, "Draining resolution workers");
                total += pool.drain().await?;
                outstanding = 0;
            }

            match next_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        total += pool.drain().await?;
        Ok(total)
    }
}

/// Resolves one slice of tagged cloud ids on a pool worker
#[derive(Clone)]
struct SliceResolver {
    reader: StoreReader,
    submitter: Arc<RecordSubmitService>,
    checker: Arc<TaskStatusChecker>,
    ctx: Arc<SubmitContext>,
    representation_name: Arc<str>,
    revision: Arc<RevisionSelector>,
}

impl SliceResolver {
    async fn resolve(self, tags: Vec<CloudTagsResponse>) -> Result<u64> {
        let task_id = self.ctx.task_id();
        let mut counted = 0;

        for tag in &tags {
            self.checker.ensure_running(task_id).await?;
            let representations = self
                .reader
                .representations_for_revision(&self.representation_name, &self.revision, &tag.cloud_id)
                .await?;
            for representation in &representations {
                counted += self.submit_representation(representation).await?;
            }
        }

        Ok(counted)
    }

    async fn submit_representation(&self, representation: &Representation) -> Result<u64> {
        let task = self.ctx.task();
        let revision = representation
            .revisions
            .iter()
            .find(|r| self.revision.identifies(r))
            .ok_or_else(|| SubmitError::RevisionNotFound {
                cloud_id: representation.cloud_id.clone(),
                representation: representation.representation_name.clone(),
                revision: self.revision.to_string(),
            })?;

        // A withdrawn representation travels as one record, never per file
        if revision.deleted {
            let record = DpsRecord::new(task.task_id, &representation.uri)
                .with_metadata_prefix(task.schema_name())
                .deleted();
            return Ok(u64::from(self.submitter.submit(&record, &self.ctx).await?));
        }

        let mut counted = 0;
        for file in &representation.files {
            let record = DpsRecord::new(task.task_id, &file.content_uri)
                .with_metadata_prefix(task.schema_name());
            if self.submitter.submit(&record, &self.ctx).await? {
                counted += 1;
            }
        }
        Ok(counted)
    }
}
