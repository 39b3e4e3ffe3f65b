use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{LedgerEntry, LedgerError, LedgerStore};

/// Ledger kept in a map, one lock around check and write
#[derive(Default)]
pub struct InMemoryLedger {
    entries: Mutex<HashMap<(i64, String), LedgerEntry>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn insert_if_absent(&self, entry: &LedgerEntry) -> Result<bool, LedgerError> {
        let mut entries = self.entries.lock().await;
        let key = (entry.task_id, entry.record_id.clone());
        if entries.contains_key(&key) {
            return Ok(false);
        }
        entries.insert(key, entry.clone());
        Ok(true)
    }

    async fn claim_for_run(
        &self,
        task_id: i64,
        record_id: &str,
        run_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(&(task_id, record_id.to_string())) {
            Some(entry) if entry.start_time < run_start => {
                entry.start_time = now;
                entry.attempt_number += 1;
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn find(&self, task_id: i64, record_id: &str) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(self
            .entries
            .lock()
            .await
            .get(&(task_id, record_id.to_string()))
            .cloned())
    }
}
