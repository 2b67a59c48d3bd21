//! Client for submitting jobs and querying their status.

use std::future::Future;
use std::sync::Arc;

use crate::error::Result;
use crate::job::{Job, JobContext, JobId, JobResult};
use crate::queue::Queue;
use crate::status::{Status, StatusCache};

/// Client for submitting jobs to a worker pool.
#[derive(Clone)]
pub struct Client {
    queue: Queue,
    statuses: Arc<StatusCache>,
}

impl Client {
    /// Create a client over an existing queue and status cache.
    pub fn new(queue: Queue, statuses: Arc<StatusCache>) -> Self {
        Self { queue, statuses }
    }

    /// Submit a job for execution.
    ///
    /// The job is recorded as `Queued` before it enters the queue. If the
    /// queue is stopped before a worker picks the job up, that `Queued` entry
    /// is the last status it ever gets.
    pub async fn submit(&self, job: Job) -> Result<JobId> {
        let job_id = job.id.clone();
        self.statuses.set_status(&job_id, Status::queued());
        if let Err(e) = self.queue.enqueue(job).await {
            self.statuses
                .set_status(&job_id, Status::failed(Default::default(), e.to_string()));
            return Err(e);
        }

        tracing::debug!(job_id = %job_id, "Job submitted");
        Ok(job_id)
    }

    /// Submit an async closure as a job.
    pub async fn submit_fn<F, Fut>(&self, id: impl Into<JobId>, f: F) -> Result<JobId>
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult> + Send + 'static,
    {
        self.submit(Job::from_fn(id, f)).await
    }

    /// Get the latest status recorded for a job.
    pub fn status(&self, id: &JobId) -> Option<Status> {
        self.statuses.status(id)
    }

    /// Get the number of jobs waiting for a worker.
    pub async fn queue_len(&self) -> Result<usize> {
        self.queue.len().await
    }

    /// Wait until every earlier submission is visible to `queue_len`.
    pub async fn sync(&self) -> Result<()> {
        self.queue.sync().await
    }

    /// Visit the ids of the jobs waiting for a worker, in order.
    pub async fn for_each_waiting<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(usize, &JobId) -> bool,
    {
        self.queue.for_each(|i, job| visit(i, &job.id)).await
    }
}
