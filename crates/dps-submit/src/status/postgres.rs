use async_trait::async_trait;
use dps_common::types::TaskState;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use super::{StatusError, TaskInfo, TaskInfoStore};

/// Task store backed by the `task_info` table
#[derive(Clone)]
pub struct PgTaskInfoStore {
    pool: PgPool,
}

impl PgTaskInfoStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_state(raw: &str) -> Result<TaskState, StatusError> {
    raw.parse()
        .map_err(|e: dps_common::DpsError| StatusError::Corrupt(e.to_string()))
}

fn to_db_size(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}

fn task_info_from_row(row: &PgRow) -> Result<TaskInfo, StatusError> {
    let state: String = row.try_get("state")?;
    let expected_size: Option<i64> = row.try_get("expected_size")?;
    Ok(TaskInfo {
        task_id: row.try_get("task_id")?,
        topology_name: row.try_get("topology_name")?,
        state: parse_state(&state)?,
        state_description: row.try_get("state_description")?,
        expected_size: expected_size.and_then(|s| u64::try_from(s).ok()),
        topic_name: row.try_get("topic_name")?,
        sent_timestamp: row.try_get("sent_timestamp")?,
        start_timestamp: row.try_get("start_timestamp")?,
        task_definition: row.try_get("task_definition")?,
    })
}

#[async_trait]
impl TaskInfoStore for PgTaskInfoStore {
    async fn upsert(&self, info: &TaskInfo) -> Result<(), StatusError> {
        sqlx::query(
            r#"
            INSERT INTO task_info
                (task_id, topology_name, state, state_description, expected_size,
                 topic_name, sent_timestamp, start_timestamp, task_definition, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            ON CONFLICT (task_id) DO UPDATE SET
                topology_name = EXCLUDED.topology_name,
                state = EXCLUDED.state,
                state_description = EXCLUDED.state_description,
                expected_size = EXCLUDED.expected_size,
                topic_name = EXCLUDED.topic_name,
                sent_timestamp = EXCLUDED.sent_timestamp,
                start_timestamp = EXCLUDED.start_timestamp,
                task_definition = EXCLUDED.task_definition,
                updated_at = NOW()
            "#,
        )
        .bind(info.task_id)
        .bind(&info.topology_name)
        .bind(info.state.as_str())
        .bind(&info.state_description)
        .bind(info.expected_size.map(to_db_size))
        .bind(&info.topic_name)
        .bind(info.sent_timestamp)
        .bind(info.start_timestamp)
        .bind(&info.task_definition)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, task_id: i64) -> Result<Option<TaskInfo>, StatusError> {
        let row = sqlx::query(
            r#"
            SELECT task_id, topology_name, state, state_description, expected_size,
                   topic_name, sent_timestamp, start_timestamp, task_definition
            FROM task_info
            WHERE task_id = $1
            "#,
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(task_info_from_row).transpose()
    }

    async fn state(&self, task_id: i64) -> Result<Option<TaskState>, StatusError> {
        let state: Option<String> = sqlx::query_scalar("SELECT state FROM task_info WHERE task_id = $1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;

        state.as_deref().map(parse_state).transpose()
    }

    async fn update_state(
        &self,
        task_id: i64,
        state: TaskState,
        description: &str,
    ) -> Result<(), StatusError> {
        let result = sqlx::query(
            r#"
            UPDATE task_info
            SET state = $2, state_description = $3, updated_at = NOW()
            WHERE task_id = $1
            "#,
        )
        .bind(task_id)
        .bind(state.as_str())
        .bind(description)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StatusError::TaskNotFound(task_id));
        }
        Ok(())
    }

    async fn update_expected_size(
        &self,
        task_id: i64,
        state: Option<(TaskState, &str)>,
        expected_size: u64,
    ) -> Result<(), StatusError> {
        let result = sqlx::query(
            r#"
            UPDATE task_info
            SET expected_size = $2,
                state = COALESCE($3, state),
                state_description = COALESCE($4, state_description),
                updated_at = NOW()
            WHERE task_id = $1
            "#,
        )
        .bind(task_id)
        .bind(to_db_size(expected_size))
        .bind(state.map(|(s, _)| s.as_str()))
        .bind(state.map(|(_, d)| d))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StatusError::TaskNotFound(task_id));
        }
        Ok(())
    }
}
