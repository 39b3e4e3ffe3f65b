use async_trait::async_trait;
use dps_common::types::DpsRecord;
use sqlx::PgPool;
use uuid::Uuid;

use super::{QueueError, RecordQueue};

/// Writes records into the `dispatch_queue` outbox table
#[derive(Clone)]
pub struct PgRecordQueue {
    pool: PgPool,
}

impl PgRecordQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordQueue for PgRecordQueue {
    async fn send(&self, topic: &str, record: &DpsRecord) -> Result<(), QueueError> {
        let payload = serde_json::to_value(record)?;

        sqlx::query(
            r#"
            INSERT INTO dispatch_queue (id, topic, task_id, record_id, payload)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(topic)
        .bind(record.task_id)
        .bind(&record.record_id)
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
