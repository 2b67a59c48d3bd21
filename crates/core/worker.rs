//! Consumer side of the queue: workers that pull jobs and execute them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::executor::JobExecutor;
use crate::job::Job;
use crate::queue::Ready;

/// Individual worker that receives jobs from the queue and runs them.
pub struct Worker {
    id: usize,
    ready: Ready,
    executor: JobExecutor,
    stop: CancellationToken,
    in_progress: Arc<AtomicUsize>,
    drain_notify: Arc<Notify>,
}

impl Worker {
    /// Create a worker pulling from `ready` until `stop` fires.
    pub fn new(
        id: usize,
        ready: Ready,
        executor: JobExecutor,
        stop: CancellationToken,
        in_progress: Arc<AtomicUsize>,
        drain_notify: Arc<Notify>,
    ) -> Self {
        Self {
            id,
            ready,
            executor,
            stop,
            in_progress,
            drain_notify,
        }
    }

    /// Receive and execute jobs until the queue stops.
    pub async fn run(&self) {
        tracing::debug!(worker_id = self.id, "Worker started");

        loop {
            let job = tokio::select! {
                biased;

                _ = self.stop.cancelled() => break,
                job = self.ready.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };
            self.process(job).await;
        }

        tracing::debug!(worker_id = self.id, "Worker stopped");
    }

    async fn process(&self, job: Job) {
        self.in_progress.fetch_add(1, Ordering::SeqCst);

        let span = tracing::info_span!("job", job_id = %job.id, worker_id = self.id);
        tracing::debug!(worker_id = self.id, job_id = %job.id, "Processing job");

        // Failures are already recorded in the status cache; a failing job
        // never takes the worker down with it.
        match self.executor.execute(&job.id, job.body.as_ref(), span).await {
            Ok(output) => {
                tracing::debug!(
                    worker_id = self.id,
                    job_id = %job.id,
                    revision = %output.revision,
                    "Job completed successfully"
                );
            }
            Err(err) => {
                tracing::warn!(
                    worker_id = self.id,
                    job_id = %job.id,
                    error = %err,
                    "Job failed"
                );
            }
        }

        self.in_progress.fetch_sub(1, Ordering::SeqCst);
        self.drain_notify.notify_one();
    }
}
