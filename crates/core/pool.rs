//! Worker pool for processing jobs.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::client::Client;
use crate::config::WorkerConfig;
use crate::error::{QueueError, Result};
use crate::executor::JobExecutor;
use crate::queue::Queue;
use crate::status::StatusCache;
use crate::worker::Worker;

/// Builder for WorkerPool.
#[derive(Debug, Default)]
pub struct WorkerPoolBuilder {
    config: WorkerConfig,
}

impl WorkerPoolBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the number of workers.
    pub fn workers(mut self, num: usize) -> Self {
        self.config.num_workers = num;
        self
    }

    /// Set the budget each job gets before its cancellation token fires.
    pub fn job_timeout(mut self, timeout: Duration) -> Self {
        self.config.job_timeout = timeout;
        self
    }

    /// Set how many job statuses are remembered.
    pub fn status_cache_size(mut self, size: usize) -> Self {
        self.config.status_cache_size = size;
        self
    }

    /// Set the shutdown timeout.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Build the WorkerPool.
    ///
    /// Starts the queue coordinator, so this must be called from within a
    /// Tokio runtime.
    pub fn build(self) -> Result<WorkerPool> {
        if self.config.num_workers == 0 {
            return Err(QueueError::Config(
                "At least one worker is required".to_string(),
            ));
        }
        Ok(WorkerPool::new(self.config))
    }
}

/// Worker pool for processing jobs.
///
/// Owns the queue coordinator, the status cache and the stop signal shared
/// by the coordinator and the workers.
pub struct WorkerPool {
    config: WorkerConfig,
    queue: Queue,
    coordinator: Option<JoinHandle<()>>,
    statuses: Arc<StatusCache>,
    executor: JobExecutor,
    stop: CancellationToken,
    in_progress: Arc<AtomicUsize>,
    drain_notify: Arc<Notify>,
}

impl WorkerPool {
    /// Create a new builder for WorkerPool.
    pub fn builder() -> WorkerPoolBuilder {
        WorkerPoolBuilder::new()
    }

    /// Create a new worker pool with the given configuration.
    ///
    /// Starts the queue coordinator, so this must be called from within a
    /// Tokio runtime.
    pub fn new(config: WorkerConfig) -> Self {
        let stop = CancellationToken::new();
        let (queue, coordinator) = Queue::spawn(stop.clone());
        let statuses = Arc::new(StatusCache::new(config.status_cache_size));
        let executor = JobExecutor::new(statuses.clone(), config.job_timeout);

        Self {
            config,
            queue,
            coordinator: Some(coordinator),
            statuses,
            executor,
            stop,
            in_progress: Arc::new(AtomicUsize::new(0)),
            drain_notify: Arc::new(Notify::new()),
        }
    }

    /// Get a client that submits jobs to this pool.
    pub fn client(&self) -> Client {
        Client::new(self.queue.clone(), self.statuses.clone())
    }

    /// Get the underlying queue.
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Get the status cache.
    pub fn statuses(&self) -> &Arc<StatusCache> {
        &self.statuses
    }

    /// Run the worker pool until Ctrl-C.
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
    }

    /// Run the worker pool until the provided shutdown future completes.
    ///
    /// Spawns the workers, waits for `shutdown`, then stops the queue and
    /// waits for in-flight jobs to finish.
    pub async fn run_until<S>(&mut self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()> + Send,
    {
        let coordinator = self
            .coordinator
            .take()
            .ok_or_else(|| QueueError::Config("Worker pool has already run".to_string()))?;

        let mut tasks = JoinSet::new();
        for worker_id in 0..self.config.num_workers {
            let worker = Worker::new(
                worker_id,
                self.queue.ready(),
                self.executor.clone(),
                self.stop.clone(),
                self.in_progress.clone(),
                self.drain_notify.clone(),
            );
            tasks.spawn(async move { worker.run().await });
        }

        tracing::info!(
            workers = self.config.num_workers,
            job_timeout_ms = self.config.job_timeout.as_millis() as u64,
            status_cache_size = self.config.status_cache_size,
            "Worker pool started"
        );

        tokio::select! {
            _ = shutdown => tracing::info!("Shutdown requested, draining..."),
            _ = self.stop.cancelled() => {}
        }

        let drained = self.shutdown().await;

        if let Err(e) = coordinator.await {
            tracing::error!(error = %e, "Queue coordinator panicked");
        }

        if drained {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Worker panicked");
                }
            }
        } else {
            // Jobs that ignore their deadline keep running in the background.
            tasks.detach_all();
        }

        tracing::info!("Worker pool stopped");
        Ok(())
    }

    /// Stop the queue and wait for in-flight jobs.
    ///
    /// Jobs still waiting in the queue are dropped without running. Returns
    /// `false` if in-flight jobs were still running when the shutdown timeout
    /// expired.
    pub async fn shutdown(&self) -> bool {
        self.stop.cancel();

        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;

        while self.in_progress.load(Ordering::SeqCst) > 0 {
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(
                    in_progress = self.in_progress.load(Ordering::SeqCst),
                    "Shutdown timeout reached, leaving jobs running"
                );
                return false;
            }

            tokio::select! {
                _ = self.drain_notify.notified() => {}
                _ = tokio::time::sleep(Duration::from_millis(100)) => {}
            }
        }

        true
    }

    /// Get the number of in-progress jobs.
    pub fn in_progress_count(&self) -> usize {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Check if the pool has been told to stop.
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}
