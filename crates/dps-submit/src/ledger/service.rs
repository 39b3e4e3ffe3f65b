use chrono::{SubsecRound, Utc};
use dps_common::types::DpsRecord;
use std::sync::Arc;
use tracing::{debug, info};

use super::{LedgerEntry, LedgerStore};
use crate::config::DEFAULT_PROGRESS_LOG_FREQUENCY;
use crate::context::{SubmitContext, TIMESTAMP_PRECISION};
use crate::error::Result;
use crate::queue::RecordQueue;

/// Submits records to the dispatch queue at most once per run
pub struct RecordSubmitService {
    ledger: Arc<dyn LedgerStore>,
    queue: Arc<dyn RecordQueue>,
    progress_log_frequency: u64,
}

impl RecordSubmitService {
    pub fn new(ledger: Arc<dyn LedgerStore>, queue: Arc<dyn RecordQueue>) -> Self {
        Self {
            ledger,
            queue,
            progress_log_frequency: DEFAULT_PROGRESS_LOG_FREQUENCY,
        }
    }

    pub fn with_progress_log_frequency(mut self, frequency: u64) -> Self {
        self.progress_log_frequency = frequency.max(1);
        self
    }

    /// Dispatch `record` unless this run already did.
    ///
    /// Returns true when the record counts toward the task's expected size:
    /// either it was never dispatched, or this is a restart and the previous
    /// dispatch belongs to an earlier run. In-run duplicates return false.
    /// The ledger entry is written before the record reaches the queue.
    pub async fn submit(&self, record: &DpsRecord, ctx: &SubmitContext) -> Result<bool> {
        let performed = ctx.record_performed();
        if performed % self.progress_log_frequency == 0 {
            info!(
                task_id = ctx.task_id(),
                performed,
                counted = ctx.counted(),
                "Submission progress"
            );
        }

        let now = Utc::now()
            .trunc_subsecs(TIMESTAMP_PRECISION)
            .max(ctx.run_start());
        let entry = LedgerEntry::queued(record, ctx.topology_name(), now);

        if !self.ledger.insert_if_absent(&entry).await? {
            let reclaimed = ctx.is_restart()
                && self
                    .ledger
                    .claim_for_run(record.task_id, &record.record_id, ctx.run_start(), now)
                    .await?;
            if !reclaimed {
                debug!(
                    task_id = record.task_id,
                    record_id = %record.record_id,
                    "Record already dispatched in this run, skipping"
                );
                return Ok(false);
            }
            debug!(
                task_id = record.task_id,
                record_id = %record.record_id,
                "Re-dispatching record left over from a previous run"
            );
        }

        self.queue.send(ctx.topic(), record).await?;
        ctx.record_counted();
        Ok(true)
    }
}
