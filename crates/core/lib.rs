//! # jobq-core - In-process job queue with status tracking
//!
//! This crate provides a job queue driven by a single coordinator task:
//! - `Queue`: FIFO waiting list owned by one coordinator loop, with a
//!   rendezvous hand-off to consumers and a `sync` barrier
//! - `JobExecutor`: runs a job body under a cooperative timeout and records
//!   its status
//! - `StatusCache`: bounded, insertion-ordered store of the latest status
//!   per job id
//! - `WorkerPool` and `Client` for running workers and submitting jobs
//! - Error types
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use jobq_core::{JobOutput, WorkerPool};
//!
//! #[tokio::main]
//! async fn main() -> jobq_core::Result<()> {
//!     let mut pool = WorkerPool::builder().workers(4).build()?;
//!     let client = pool.client();
//!
//!     client
//!         .submit_fn("build 42", |ctx| async move {
//!             tracing::info!(parent: &ctx.span, "building");
//!             Ok(JobOutput::revision("abc123"))
//!         })
//!         .await?;
//!
//!     pool.run().await
//! }
//! ```

mod client;
mod config;
mod error;
mod executor;
mod job;
mod pool;
mod queue;
mod status;
mod worker;

// Re-export main types
pub use client::Client;
pub use config::{WorkerConfig, WorkerConfigBuilder, DEFAULT_STATUS_CACHE_SIZE};
pub use error::{QueueError, Result};
pub use executor::{JobExecutor, DEFAULT_JOB_TIMEOUT};
pub use job::{Job, JobBody, JobContext, JobError, JobId, JobOutput, JobResult};
pub use pool::{WorkerPool, WorkerPoolBuilder};
pub use queue::{Queue, Ready};
pub use status::{Status, StatusCache, StatusKind};
pub use worker::Worker;
