use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use super::{LedgerEntry, LedgerError, LedgerStore, RecordState};

/// Ledger backed by the `processed_records` table
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn insert_if_absent(&self, entry: &LedgerEntry) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_records
                (task_id, record_id, state, start_time, attempt_number, topology_name)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (task_id, record_id) DO NOTHING
            "#,
        )
        .bind(entry.task_id)
        .bind(&entry.record_id)
        .bind(entry.state.as_str())
        .bind(entry.start_time)
        .bind(entry.attempt_number)
        .bind(&entry.topology_name)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn claim_for_run(
        &self,
        task_id: i64,
        record_id: &str,
        run_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE processed_records
            SET start_time = $3, attempt_number = attempt_number + 1, state = $4
            WHERE task_id = $1 AND record_id = $2 AND start_time < $5
            "#,
        )
        .bind(task_id)
        .bind(record_id)
        .bind(now)
        .bind(RecordState::Queued.as_str())
        .bind(run_start)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find(&self, task_id: i64, record_id: &str) -> Result<Option<LedgerEntry>, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT task_id, record_id, start_time, attempt_number, topology_name
            FROM processed_records
            WHERE task_id = $1 AND record_id = $2
            "#,
        )
        .bind(task_id)
        .bind(record_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok::<_, sqlx::Error>(LedgerEntry {
                task_id: row.try_get("task_id")?,
                record_id: row.try_get("record_id")?,
                state: RecordState::Queued,
                start_time: row.try_get("start_time")?,
                attempt_number: row.try_get("attempt_number")?,
                topology_name: row.try_get("topology_name")?,
            })
        })
        .transpose()
        .map_err(LedgerError::Database)
    }
}
