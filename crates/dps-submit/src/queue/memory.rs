use async_trait::async_trait;
use dps_common::types::DpsRecord;
use tokio::sync::Mutex;

use super::{QueueError, RecordQueue};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub topic: String,
    pub record: DpsRecord,
}

/// Keeps every sent message in order of arrival
#[derive(Default)]
pub struct InMemoryRecordQueue {
    messages: Mutex<Vec<QueuedMessage>>,
}

impl InMemoryRecordQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn messages(&self) -> Vec<QueuedMessage> {
        self.messages.lock().await.clone()
    }

    pub async fn record_ids(&self) -> Vec<String> {
        self.messages
            .lock()
            .await
            .iter()
            .map(|m| m.record.record_id.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.lock().await.is_empty()
    }
}

#[async_trait]
impl RecordQueue for InMemoryRecordQueue {
    async fn send(&self, topic: &str, record: &DpsRecord) -> Result<(), QueueError> {
        self.messages.lock().await.push(QueuedMessage {
            topic: topic.to_string(),
            record: record.clone(),
        });
        Ok(())
    }
}
