//! Error types for task submission

use dps_common::DpsError;
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::queue::QueueError;
use crate::reader::StoreError;
use crate::status::StatusError;

/// Result type alias for submission operations
pub type Result<T> = std::result::Result<T, SubmitError>;

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Unknown topology: {0}")]
    UnknownTopology(String),

    #[error("No dispatch topic configured for topology {0}")]
    NoTopic(String),

    #[error(transparent)]
    Task(#[from] DpsError),

    #[error("Failed to {operation} after {attempts} attempt(s): {source}")]
    StoreRead {
        operation: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("Revision {revision} not found on representation {representation} of {cloud_id}")]
    RevisionNotFound {
        cloud_id: String,
        representation: String,
        revision: String,
    },

    /// Cooperative cancellation requested by an operator
    #[error("Task {task_id} was killed")]
    Killed { task_id: i64 },

    /// The process is shutting down
    #[error("Submission of task {task_id} was interrupted")]
    Interrupted { task_id: i64 },

    #[error("Dispatch queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Task status error: {0}")]
    Status(#[from] StatusError),

    #[error("Repository error: {0:#}")]
    Repository(#[source] anyhow::Error),

    #[error("Harvest failed: {0}")]
    Harvest(String),

    #[error("Record index error: {0}")]
    Index(String),

    #[error("Resolution worker failed: {0}")]
    WorkerFailed(String),
}

impl SubmitError {
    pub fn is_killed(&self) -> bool {
        matches!(self, SubmitError::Killed { .. })
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, SubmitError::Interrupted { .. })
    }
}
