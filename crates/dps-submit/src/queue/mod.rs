//! Downstream dispatch queue
//!
//! Records are produced to a topic chosen once per task. The Postgres
//! implementation is an outbox table drained by the processing topology.

use async_trait::async_trait;
use dps_common::types::DpsRecord;
use thiserror::Error;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryRecordQueue;
pub use postgres::PgRecordQueue;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Queue unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RecordQueue: Send + Sync {
    async fn send(&self, topic: &str, record: &DpsRecord) -> Result<(), QueueError>;
}
