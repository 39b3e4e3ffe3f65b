//! Task lifecycle persistence and the kill signal
//!
//! The task metadata store is the source of truth for both. An operator kill
//! drops the task in the store; [`TaskStatusChecker`] notices it on its next
//! poll and resolution stops at the next check point.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dps_common::types::TaskState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod checker;
pub mod memory;
pub mod postgres;
mod updater;

pub use checker::TaskStatusChecker;
pub use memory::InMemoryTaskInfoStore;
pub use postgres::PgTaskInfoStore;
pub use updater::TaskStatusUpdater;

#[derive(Error, Debug)]
pub enum StatusError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Task {0} not found")]
    TaskNotFound(i64),

    #[error("Corrupt task row: {0}")]
    Corrupt(String),
}

/// Persisted view of one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub task_id: i64,
    pub topology_name: String,
    pub state: TaskState,
    pub state_description: String,
    pub expected_size: Option<u64>,
    pub topic_name: Option<String>,
    pub sent_timestamp: DateTime<Utc>,
    pub start_timestamp: Option<DateTime<Utc>>,
    pub task_definition: Option<serde_json::Value>,
}

impl TaskInfo {
    pub fn new(task_id: i64, topology_name: impl Into<String>, state: TaskState) -> Self {
        Self {
            task_id,
            topology_name: topology_name.into(),
            state,
            state_description: String::new(),
            expected_size: None,
            topic_name: None,
            sent_timestamp: Utc::now(),
            start_timestamp: None,
            task_definition: None,
        }
    }
}

#[async_trait]
pub trait TaskInfoStore: Send + Sync {
    /// Insert or replace the task row
    async fn upsert(&self, info: &TaskInfo) -> Result<(), StatusError>;

    async fn find(&self, task_id: i64) -> Result<Option<TaskInfo>, StatusError>;

    async fn state(&self, task_id: i64) -> Result<Option<TaskState>, StatusError>;

    async fn update_state(
        &self,
        task_id: i64,
        state: TaskState,
        description: &str,
    ) -> Result<(), StatusError>;

    /// `state = None` leaves the current state untouched
    async fn update_expected_size(
        &self,
        task_id: i64,
        state: Option<(TaskState, &str)>,
        expected_size: u64,
    ) -> Result<(), StatusError>;
}
