//! Job definition and related types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::QueueError;

/// Identifier for a job.
///
/// Ids are chosen by the caller and are not required to be unique; status
/// lookups resolve to the most recent write for an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create a JobId from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new random JobId.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Output produced by a job body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutput {
    /// Revision produced by the job, empty when the job produced none.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub revision: String,
}

impl JobOutput {
    /// Output carrying the given revision.
    pub fn revision(revision: impl Into<String>) -> Self {
        Self {
            revision: revision.into(),
        }
    }
}

/// Result type for job bodies.
pub type JobResult = std::result::Result<JobOutput, JobError>;

/// Error returned from job bodies.
#[derive(Debug, Clone)]
pub struct JobError {
    /// Error message.
    pub message: String,
    /// Partial output produced before the failure.
    pub output: JobOutput,
}

impl JobError {
    /// Create a new error with no output.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            output: JobOutput::default(),
        }
    }

    /// Attach the output the job produced before failing.
    pub fn with_output(mut self, output: JobOutput) -> Self {
        self.output = output;
        self
    }
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl<E: std::error::Error> From<E> for JobError {
    fn from(err: E) -> Self {
        Self::new(err.to_string())
    }
}

impl From<JobError> for QueueError {
    fn from(err: JobError) -> Self {
        QueueError::JobExecution(err.message)
    }
}

/// Everything a job body receives when it runs.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Id of the job being executed.
    pub id: JobId,
    /// Cancelled once the job timeout elapses. Bodies are expected to watch
    /// it; nothing forces them to.
    pub cancel: CancellationToken,
    /// Instant at which `cancel` fires.
    pub deadline: Instant,
    /// Span the body should log under.
    pub span: tracing::Span,
}

impl JobContext {
    /// Whether the job timeout has already elapsed.
    pub fn is_expired(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// The work a job performs.
#[async_trait]
pub trait JobBody: Send + Sync {
    async fn run(&self, ctx: JobContext) -> JobResult;
}

#[async_trait]
impl<F, Fut> JobBody for F
where
    F: Fn(JobContext) -> Fut + Send + Sync,
    Fut: Future<Output = JobResult> + Send + 'static,
{
    async fn run(&self, ctx: JobContext) -> JobResult {
        (self)(ctx).await
    }
}

/// A unit of work: an id and the body to run.
#[derive(Clone)]
pub struct Job {
    /// Job identifier.
    pub id: JobId,
    /// The job body, shared so snapshots of the queue stay cheap.
    pub body: Arc<dyn JobBody>,
}

impl Job {
    /// Create a new job from an id and a body.
    pub fn new(id: impl Into<JobId>, body: impl JobBody + 'static) -> Self {
        Self {
            id: id.into(),
            body: Arc::new(body),
        }
    }

    /// Create a new job from an async closure.
    pub fn from_fn<F, Fut>(id: impl Into<JobId>, f: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult> + Send + 'static,
    {
        Self::new(id, f)
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job").field("id", &self.id).finish_non_exhaustive()
    }
}
