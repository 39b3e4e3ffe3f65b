use dps_common::types::TaskState;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::TaskInfoStore;
use crate::config::DEFAULT_KILL_CHECK_INTERVAL_MS;
use crate::error::{Result, SubmitError};

#[derive(Debug, Clone, Copy)]
enum Answer {
    Killed,
    Running { checked_at: Instant },
}

/// Process-wide source of cancellation for running submissions.
///
/// Construct one per process and share it. It answers two questions at every
/// check point: was the task killed by an operator, and is the process
/// shutting down. A kill is remembered for good once seen; a negative answer
/// is trusted for `check_interval` before the store is asked again.
pub struct TaskStatusChecker {
    store: Arc<dyn TaskInfoStore>,
    check_interval: Duration,
    shutdown: CancellationToken,
    answers: Mutex<HashMap<i64, Answer>>,
}

impl TaskStatusChecker {
    pub fn new(store: Arc<dyn TaskInfoStore>, shutdown: CancellationToken) -> Self {
        Self {
            store,
            check_interval: Duration::from_millis(DEFAULT_KILL_CHECK_INTERVAL_MS),
            shutdown,
            answers: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn has_kill_signal(&self, task_id: i64) -> bool {
        match self.cached(task_id) {
            Some(Answer::Killed) => return true,
            Some(Answer::Running { checked_at }) if checked_at.elapsed() < self.check_interval => {
                return false;
            },
            _ => {},
        }

        let killed = match self.store.state(task_id).await {
            Ok(state) => state == Some(TaskState::Dropped),
            Err(e) => {
                warn!(task_id, error = %e, "Could not read task state, assuming it is still running");
                false
            },
        };

        let answer = if killed {
            info!(task_id, "Kill signal observed");
            Answer::Killed
        } else {
            Answer::Running {
                checked_at: Instant::now(),
            }
        };
        self.answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task_id, answer);
        killed
    }

    /// Fails with `Interrupted` on shutdown and `Killed` on an operator kill
    pub async fn ensure_running(&self, task_id: i64) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(SubmitError::Interrupted { task_id });
        }
        if self.has_kill_signal(task_id).await {
            return Err(SubmitError::Killed { task_id });
        }
        Ok(())
    }

    /// Drop whatever is remembered about `task_id`, used when a task is
    /// (re)submitted
    pub fn forget(&self, task_id: i64) {
        self.answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&task_id);
    }

    fn cached(&self, task_id: i64) -> Option<Answer> {
        self.answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&task_id)
            .copied()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::status::{InMemoryTaskInfoStore, TaskInfo};

    async fn store_with_task(task_id: i64) -> Arc<InMemoryTaskInfoStore> {
        let store = Arc::new(InMemoryTaskInfoStore::new());
        store
            .upsert(&TaskInfo::new(task_id, "validation_topology", TaskState::Resolving))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_kill_is_remembered() {
        let store = store_with_task(1).await;
        let checker = TaskStatusChecker::new(store.clone(), CancellationToken::new())
            .with_check_interval(Duration::ZERO);

        assert!(!checker.has_kill_signal(1).await);
        store.kill(1).await;
        assert!(checker.has_kill_signal(1).await);

        store
            .update_state(1, TaskState::Resolving, "revived")
            .await
            .unwrap();
        assert!(checker.has_kill_signal(1).await);

        checker.forget(1);
        assert!(!checker.has_kill_signal(1).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_negative_answer_is_cached_for_interval() {
        let store = store_with_task(1).await;
        let checker = TaskStatusChecker::new(store.clone(), CancellationToken::new())
            .with_check_interval(Duration::from_secs(5));

        assert!(!checker.has_kill_signal(1).await);
        store.kill(1).await;
        assert!(!checker.has_kill_signal(1).await);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(checker.has_kill_signal(1).await);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts() {
        let store = store_with_task(1).await;
        let token = CancellationToken::new();
        let checker = TaskStatusChecker::new(store, token.clone());

        checker.ensure_running(1).await.unwrap();
        token.cancel();
        assert!(matches!(
            checker.ensure_running(1).await,
            Err(SubmitError::Interrupted { task_id: 1 })
        ));
    }
}
