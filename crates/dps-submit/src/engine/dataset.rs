//! Entire-dataset path: one sequential pass over every representation

use dps_common::types::{DataSetRef, DpsRecord};
use std::sync::Arc;
use tracing::debug;

use super::DispatchEngine;
use crate::context::SubmitContext;
use crate::error::Result;

impl DispatchEngine {
    pub(super) async fn scan_dataset(
        &self,
        ctx: &Arc<SubmitContext>,
        dataset: &DataSetRef,
    ) -> Result<u64> {
        let task = ctx.task();
        let wanted = task.representation_name();
        let mut representations = self.reader.entire_dataset_iterator(dataset);
        let mut counted = 0;

        while let Some(representation) = representations.try_next().await? {
            self.checker.ensure_running(task.task_id).await?;
            if wanted.is_some_and(|name| name != representation.representation_name) {
                continue;
            }

            for file in &representation.files {
                let record = DpsRecord::new(task.task_id, &file.content_uri)
                    .with_metadata_prefix(task.schema_name());
                if self.submitter.submit(&record, ctx).await? {
                    counted += 1;
                }
            }
        }

        debug!(task_id = task.task_id, %dataset, counted, "Dataset scanned");
        Ok(counted)
    }
}
