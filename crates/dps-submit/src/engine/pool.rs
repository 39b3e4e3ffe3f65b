//! Bounded worker pool scoped to one revision scan

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, warn};

use crate::error::{Result, SubmitError};

/// At most `size` workers run at once. Dropping the pool aborts whatever is
/// still running, so every exit path releases it.
pub(crate) struct WorkerPool {
    task_id: i64,
    permits: Arc<Semaphore>,
    workers: JoinSet<Result<u64>>,
    shutdown_timeout: Duration,
}

impl WorkerPool {
    pub(crate) fn new(task_id: i64, size: usize, shutdown_timeout: Duration) -> Self {
        Self {
            task_id,
            permits: Arc::new(Semaphore::new(size.max(1))),
            workers: JoinSet::new(),
            shutdown_timeout,
        }
    }

    pub(crate) fn spawn<F>(&mut self, work: F)
    where
        F: Future<Output = Result<u64>> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        self.workers.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| SubmitError::WorkerFailed("worker pool is shut down".to_string()))?;
            work.await
        });
    }

    /// Wait for every spawned worker and sum their counts. The first failure
    /// is returned as is, so a worker's `Killed` surfaces unchanged.
    pub(crate) async fn drain(&mut self) -> Result<u64> {
        let mut total = 0;
        while let Some(joined) = self.workers.join_next().await {
            total += self.join_result(joined)?;
        }
        Ok(total)
    }

    /// Stop accepting work and give running workers `shutdown_timeout` to
    /// finish before aborting them
    pub(crate) async fn shutdown(mut self) {
        self.permits.close();
        if self.workers.is_empty() {
            return;
        }

        let pending = self.workers.len();
        debug!(task_id = self.task_id, pending, "Waiting for resolution workers");
        let workers = &mut self.workers;
        let finished = tokio::time::timeout(self.shutdown_timeout, async move {
            while workers.join_next().await.is_some() {}
        })
        .await
        .is_ok();

        if !finished {
            warn!(
                task_id = self.task_id,
                remaining = self.workers.len(),
                "Resolution workers did not stop in time, aborting them"
            );
            self.workers.abort_all();
        }
    }

    fn join_result(&self, joined: std::result::Result<Result<u64>, JoinError>) -> Result<u64> {
        match joined {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(SubmitError::Interrupted {
                task_id: self.task_id,
            }),
            Err(e) => Err(SubmitError::WorkerFailed(e.to_string())),
        }
    }
}
