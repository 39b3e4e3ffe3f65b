//! Dedup ledger and idempotent record submission
//!
//! Every (task, record) pair handed to the dispatch queue gets a ledger entry
//! first. The entry decides whether a later resolution of the same record is
//! a fresh dispatch, a re-dispatch of a resumed run, or an in-run duplicate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dps_common::types::DpsRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;
pub mod postgres;
mod service;

pub use memory::InMemoryLedger;
pub use postgres::PgLedgerStore;
pub use service::RecordSubmitService;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// Dispatch state of one ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordState {
    Queued,
}

impl RecordState {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordState::Queued => "QUEUED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub task_id: i64,
    pub record_id: String,
    pub state: RecordState,
    /// Last time this record was dispatched
    pub start_time: DateTime<Utc>,
    pub attempt_number: i32,
    pub topology_name: String,
}

impl LedgerEntry {
    pub fn queued(record: &DpsRecord, topology_name: &str, start_time: DateTime<Utc>) -> Self {
        Self {
            task_id: record.task_id,
            record_id: record.record_id.clone(),
            state: RecordState::Queued,
            start_time,
            attempt_number: 0,
            topology_name: topology_name.to_string(),
        }
    }
}

/// Persistent (task id, record id) ledger
///
/// Both write operations are atomic on the store side, so concurrent
/// workers resolving the same record cannot both win.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert unless an entry for the same key exists. True when inserted.
    async fn insert_if_absent(&self, entry: &LedgerEntry) -> Result<bool, LedgerError>;

    /// Move the entry's start time to `now` if it is older than `run_start`.
    /// True when this caller claimed the record for the current run.
    async fn claim_for_run(
        &self,
        task_id: i64,
        record_id: &str,
        run_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, LedgerError>;

    async fn find(&self, task_id: i64, record_id: &str) -> Result<Option<LedgerEntry>, LedgerError>;
}
