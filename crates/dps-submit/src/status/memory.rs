use async_trait::async_trait;
use dps_common::types::TaskState;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{StatusError, TaskInfo, TaskInfoStore};

pub const KILLED_DESCRIPTION: &str = "Dropped by the user";

#[derive(Default)]
struct Inner {
    tasks: HashMap<i64, TaskInfo>,
    /// Remaining state reads before a scheduled kill takes effect
    kill_after: HashMap<i64, u32>,
}

/// Task store kept in memory, with operator kill simulation
#[derive(Default)]
pub struct InMemoryTaskInfoStore {
    inner: Mutex<Inner>,
}

impl InMemoryTaskInfoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the task the way an operator kill does
    pub async fn kill(&self, task_id: i64) {
        let mut inner = self.inner.lock().await;
        Self::drop_task(&mut inner, task_id);
    }

    /// Let `reads` more state reads see the task as it is, then kill it
    pub async fn kill_after_reads(&self, task_id: i64, reads: u32) {
        self.inner.lock().await.kill_after.insert(task_id, reads);
    }

    fn drop_task(inner: &mut Inner, task_id: i64) {
        let info = inner
            .tasks
            .entry(task_id)
            .or_insert_with(|| TaskInfo::new(task_id, "", TaskState::Dropped));
        info.state = TaskState::Dropped;
        info.state_description = KILLED_DESCRIPTION.to_string();
    }
}

#[async_trait]
impl TaskInfoStore for InMemoryTaskInfoStore {
    async fn upsert(&self, info: &TaskInfo) -> Result<(), StatusError> {
        self.inner
            .lock()
            .await
            .tasks
            .insert(info.task_id, info.clone());
        Ok(())
    }

    async fn find(&self, task_id: i64) -> Result<Option<TaskInfo>, StatusError> {
        Ok(self.inner.lock().await.tasks.get(&task_id).cloned())
    }

    async fn state(&self, task_id: i64) -> Result<Option<TaskState>, StatusError> {
        let mut inner = self.inner.lock().await;
        if let Some(remaining) = inner.kill_after.get_mut(&task_id) {
            if *remaining == 0 {
                inner.kill_after.remove(&task_id);
                Self::drop_task(&mut inner, task_id);
            } else {
                *remaining -= 1;
            }
        }
        Ok(inner.tasks.get(&task_id).map(|t| t.state))
    }

    async fn update_state(
        &self,
        task_id: i64,
        state: TaskState,
        description: &str,
    ) -> Result<(), StatusError> {
        let mut inner = self.inner.lock().await;
        let info = inner
            .tasks
            .get_mut(&task_id)
            .ok_or(StatusError::TaskNotFound(task_id))?;
        info.state = state;
        info.state_description = description.to_string();
        Ok(())
    }

    async fn update_expected_size(
        &self,
        task_id: i64,
        state: Option<(TaskState, &str)>,
        expected_size: u64,
    ) -> Result<(), StatusError> {
        let mut inner = self.inner.lock().await;
        let info = inner
            .tasks
            .get_mut(&task_id)
            .ok_or(StatusError::TaskNotFound(task_id))?;
        info.expected_size = Some(expected_size);
        if let Some((state, description)) = state {
            info.state = state;
            info.state_description = description.to_string();
        }
        Ok(())
    }
}
