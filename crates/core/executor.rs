//! Runs job bodies under a time budget and records their status.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::job::{JobBody, JobContext, JobId, JobResult};
use crate::status::{Status, StatusCache};

/// Default budget for a single job. Jobs can do substantial work, so this is
/// deliberately generous; it only decides when a job counts as stuck.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(60);

/// Executes job bodies and keeps the status cache up to date.
#[derive(Debug, Clone)]
pub struct JobExecutor {
    statuses: Arc<StatusCache>,
    job_timeout: Duration,
}

impl JobExecutor {
    /// Create an executor that records statuses in `statuses`.
    pub fn new(statuses: Arc<StatusCache>, job_timeout: Duration) -> Self {
        Self {
            statuses,
            job_timeout,
        }
    }

    /// Get the status cache this executor writes to.
    pub fn statuses(&self) -> &Arc<StatusCache> {
        &self.statuses
    }

    /// Budget each job gets before its cancellation token fires.
    pub fn job_timeout(&self) -> Duration {
        self.job_timeout
    }

    /// Run `body` for `id`, moving its status Running -> Succeeded/Failed.
    ///
    /// The body receives a cancellation token that fires once the job
    /// timeout elapses. The timeout is cooperative: a body that ignores the
    /// token keeps running and this call waits for it.
    pub async fn execute(&self, id: &JobId, body: &dyn JobBody, span: tracing::Span) -> JobResult {
        self.statuses.set_status(id, Status::running());

        let deadline = Instant::now() + self.job_timeout;
        let cancel = CancellationToken::new();

        let ctx = JobContext {
            id: id.clone(),
            cancel: cancel.clone(),
            deadline,
            span: span.clone(),
        };

        tracing::debug!(parent: &span, job_id = %id, "Job running");
        let started = Instant::now();
        let run = body.run(ctx).instrument(span.clone());
        tokio::pin!(run);

        let finished = tokio::select! {
            biased;

            result = &mut run => Some(result),
            _ = tokio::time::sleep_until(deadline) => None,
        };
        let result = match finished {
            Some(result) => result,
            None => {
                tracing::warn!(
                    parent: &span,
                    job_id = %id,
                    "Job timeout elapsed, signalling cancellation"
                );
                cancel.cancel();
                run.await
            }
        };

        match &result {
            Ok(output) => {
                tracing::debug!(
                    parent: &span,
                    job_id = %id,
                    revision = %output.revision,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Job succeeded"
                );
                self.statuses.set_status(id, Status::succeeded(output.clone()));
            }
            Err(err) => {
                tracing::debug!(
                    parent: &span,
                    job_id = %id,
                    error = %err,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Job failed"
                );
                self.statuses
                    .set_status(id, Status::failed(err.output.clone(), err.message.clone()));
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Job, JobError, JobOutput};
    use crate::status::StatusKind;

    fn executor(timeout: Duration) -> JobExecutor {
        JobExecutor::new(Arc::new(StatusCache::new(8)), timeout)
    }

    #[tokio::test]
    async fn test_success_marks_succeeded() {
        let exec = executor(DEFAULT_JOB_TIMEOUT);
        let statuses = exec.statuses().clone();
        let id = JobId::from("ok");

        let job = Job::from_fn("ok", move |ctx| {
            let statuses = statuses.clone();
            async move {
                // Running is visible while the body executes.
                assert_eq!(
                    statuses.status(&ctx.id).map(|s| s.status),
                    Some(StatusKind::Running)
                );
                Ok(JobOutput::revision("r1"))
            }
        });

        let output = exec
            .execute(&id, job.body.as_ref(), tracing::Span::none())
            .await
            .unwrap();
        assert_eq!(output.revision, "r1");

        let status = exec.statuses().status(&id).unwrap();
        assert_eq!(status.status, StatusKind::Succeeded);
        assert_eq!(status.result.revision, "r1");
        assert!(status.err.is_empty());
    }

    #[tokio::test]
    async fn test_failure_marks_failed_with_message() {
        let exec = executor(DEFAULT_JOB_TIMEOUT);
        let id = JobId::from("bad");
        let job = Job::from_fn("bad", |_ctx| async {
            Err(JobError::new("exploded").with_output(JobOutput::revision("partial")))
        });

        let err = exec
            .execute(&id, job.body.as_ref(), tracing::Span::none())
            .await
            .unwrap_err();
        assert_eq!(err.message, "exploded");

        let status = exec.statuses().status(&id).unwrap();
        assert_eq!(status.status, StatusKind::Failed);
        assert_eq!(status.err, "exploded");
        assert_eq!(status.result.revision, "partial");
    }

    #[tokio::test(start_paused = true)]
    async fn test_body_observes_expiry() {
        let exec = executor(Duration::from_secs(5));
        let id = JobId::from("slow");
        let job = Job::from_fn("slow", |ctx| async move {
            tokio::select! {
                _ = ctx.cancel.cancelled() => Err(JobError::new("job timed out")),
                _ = tokio::time::sleep(Duration::from_secs(3600)) => Ok(JobOutput::default()),
            }
        });

        let err = exec
            .execute(&id, job.body.as_ref(), tracing::Span::none())
            .await
            .unwrap_err();
        assert_eq!(err.message, "job timed out");
        assert_eq!(
            exec.statuses().status(&id).unwrap().status,
            StatusKind::Failed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_body_ignoring_expiry_runs_to_completion() {
        let exec = executor(Duration::from_secs(1));
        let id = JobId::from("stubborn");
        let job = Job::from_fn("stubborn", |ctx| async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            assert!(ctx.is_expired());
            Ok(JobOutput::revision("late"))
        });

        let output = exec
            .execute(&id, job.body.as_ref(), tracing::Span::none())
            .await
            .unwrap();
        assert_eq!(output.revision, "late");
        assert_eq!(
            exec.statuses().status(&id).unwrap().status,
            StatusKind::Succeeded
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_execution_leaves_no_task_behind() {
        let exec = executor(DEFAULT_JOB_TIMEOUT);
        let id = JobId::from("abandoned");
        let job = Job::from_fn("abandoned", |_ctx| async {
            std::future::pending::<()>().await;
            Ok(JobOutput::default())
        });

        let res = tokio::time::timeout(
            Duration::from_secs(1),
            exec.execute(&id, job.body.as_ref(), tracing::Span::none()),
        )
        .await;
        assert!(res.is_err());

        let metrics = tokio::runtime::Handle::current().metrics();
        assert_eq!(metrics.num_alive_tasks(), 0);
        assert_eq!(
            exec.statuses().status(&id).unwrap().status,
            StatusKind::Running
        );
    }

    #[tokio::test]
    async fn test_deadline_matches_timeout() {
        let exec = executor(Duration::from_secs(30));
        let id = JobId::from("deadline");
        let before = Instant::now();
        let job = Job::from_fn("deadline", move |ctx| async move {
            let budget = ctx.deadline - before;
            assert!(budget >= Duration::from_secs(30));
            assert!(budget < Duration::from_secs(31));
            assert!(!ctx.is_expired());
            Ok(JobOutput::default())
        });

        exec.execute(&id, job.body.as_ref(), tracing::Span::none())
            .await
            .unwrap();
    }
}
