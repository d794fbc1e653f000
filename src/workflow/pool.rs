//! Bounded pool for browser work.
//!
//! Browser interactions are slow and memory hungry, so at most `size` of
//! them run at once. Jobs run on their own tasks; a caller that stops
//! waiting does not abort the job, which keeps session state consistent.
//! A job may first wait in a stage that holds no worker, such as the
//! per-user session lock.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Reasons a submitted job produced no result.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Worker pool is shutting down")]
    ShuttingDown,

    #[error("Job was cancelled")]
    Cancelled,

    #[error("Job panicked: {0}")]
    Panicked(String),
}

/// Runs async jobs with a fixed concurrency limit.
#[derive(Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
    size: usize,
}

impl WorkerPool {
    /// Creates a pool running at most `size` jobs at once (minimum one).
    #[must_use]
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            shutdown: CancellationToken::new(),
            size,
        }
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Number of jobs that could start right now.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Runs `job` once a worker is free and returns its output.
    pub async fn submit<F, T>(&self, job: F) -> Result<T, PoolError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit_staged(async {}, move |()| job).await
    }

    /// Runs `stage` first, then `job` on its output once a worker is free.
    ///
    /// Time spent in `stage` holds no worker, so jobs queued behind a
    /// per-user lock do not keep other users' jobs from starting.
    pub async fn submit_staged<S, R, J, F, T>(&self, stage: S, job: J) -> Result<T, PoolError>
    where
        S: Future<Output = R> + Send + 'static,
        R: Send + 'static,
        J: FnOnce(R) -> F + Send + 'static,
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            return Err(PoolError::ShuttingDown);
        }

        let permits = Arc::clone(&self.permits);
        let token = self.shutdown.clone();

        let handle = tokio::spawn(async move {
            let staged = tokio::select! {
                staged = stage => staged,
                () = token.cancelled() => return None,
            };
            let _permit = tokio::select! {
                permit = permits.acquire_owned() => permit.ok()?,
                () = token.cancelled() => return None,
            };
            tokio::select! {
                output = job(staged) => Some(output),
                () = token.cancelled() => None,
            }
        });

        match handle.await {
            Ok(Some(output)) => Ok(output),
            Ok(None) => Err(PoolError::Cancelled),
            Err(e) if e.is_panic() => Err(PoolError::Panicked(e.to_string())),
            Err(e) => {
                debug!("Pool job aborted: {}", e);
                Err(PoolError::Cancelled)
            }
        }
    }

    /// Stops accepting jobs and cancels queued and running ones.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Shutting down worker pool");
            self.shutdown.cancel();
            self.permits.close();
        }
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_submit_returns_output() {
        let pool = WorkerPool::new(2);
        assert_eq!(pool.submit(async { 40 + 2 }).await.unwrap(), 42);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let pool = Arc::new(WorkerPool::new(2));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..6)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    pool.submit(async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_size_still_runs_jobs() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.submit(async { "done" }).await.unwrap(), "done");
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_rejected() {
        let pool = WorkerPool::new(1);
        pool.shutdown();
        assert!(pool.is_shut_down());
        assert!(matches!(
            pool.submit(async {}).await,
            Err(PoolError::ShuttingDown)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_running_job() {
        let pool = Arc::new(WorkerPool::new(1));
        let running = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                pool.submit(tokio::time::sleep(Duration::from_secs(3600))).await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.shutdown();

        assert!(matches!(running.await.unwrap(), Err(PoolError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_stage_holds_no_worker() {
        let pool = Arc::new(WorkerPool::new(1));
        let gate = Arc::new(tokio::sync::Notify::new());

        let blocked = {
            let pool = Arc::clone(&pool);
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                pool.submit_staged(async move { gate.notified().await }, |()| async { "late" })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(pool.available(), 1);

        // A job with nothing to wait for runs while the other one is staged.
        let quick = tokio::time::timeout(Duration::from_millis(10), pool.submit(async { "quick" }));
        assert_eq!(quick.await.unwrap().unwrap(), "quick");

        gate.notify_one();
        assert_eq!(blocked.await.unwrap().unwrap(), "late");
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_staged_job() {
        let pool = Arc::new(WorkerPool::new(1));
        let staged = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                pool.submit_staged(std::future::pending::<()>(), |()| async {})
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.shutdown();

        assert!(matches!(staged.await.unwrap(), Err(PoolError::Cancelled)));
    }

    #[tokio::test]
    async fn test_panicking_job_is_reported() {
        let pool = WorkerPool::new(1);
        let result = pool.submit::<_, ()>(async { panic!("boom") }).await;
        assert!(matches!(result, Err(PoolError::Panicked(_))));
        // The permit is returned even though the job panicked.
        assert_eq!(pool.available(), 1);
    }
}
