//! Error types for the jobq library.

use thiserror::Error;

/// The main error type for the jobq library.
#[derive(Error, Debug)]
pub enum QueueError {
    /// The coordinator loop has exited; no further operations are accepted.
    #[error("Queue stopped")]
    Stopped,

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A job body reported a failure.
    #[error("Job execution error: {0}")]
    JobExecution(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using QueueError.
pub type Result<T> = std::result::Result<T, QueueError>;
