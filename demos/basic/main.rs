//! Basic example: submit a batch of jobs, run a worker pool, report statuses.
//!
//! This example demonstrates:
//! - Submitting jobs through a client and watching the queue drain
//! - Using `sync` to make queue length observable
//! - Jobs that fail or honour their cancellation token
//!
//! Run with: `cargo run -p demo-basic`

use std::time::Duration;

use jobq_core::{JobContext, JobError, JobId, JobOutput, JobResult, StatusKind, WorkerPool};
use tracing_subscriber::EnvFilter;

/// Pretend to deploy a revision named after the job.
async fn deploy(ctx: JobContext) -> JobResult {
    tracing::info!(parent: &ctx.span, "deploying");

    tokio::select! {
        _ = ctx.cancel.cancelled() => Err(JobError::new("deploy timed out")),
        _ = tokio::time::sleep(Duration::from_millis(20)) => {
            Ok(JobOutput::revision(ctx.id.to_string()))
        }
    }
}

/// Always fails.
async fn broken(ctx: JobContext) -> JobResult {
    tracing::info!(parent: &ctx.span, "about to fail");
    Err(JobError::new("remote rejected the push"))
}

#[tokio::main]
async fn main() -> jobq_core::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("jobq example\n");

    let mut pool = WorkerPool::builder()
        .workers(4)
        .job_timeout(Duration::from_secs(5))
        .build()?;
    let client = pool.client();

    let mut ids = Vec::new();
    for i in 1..=20 {
        ids.push(client.submit_fn(format!("job {}", i), deploy).await?);
    }
    ids.push(client.submit_fn("job broken", broken).await?);

    client.sync().await?;
    println!("{} jobs waiting before workers start", client.queue_len().await?);

    let watched = ids.clone();
    let watcher = client.clone();
    pool.run_until(async move {
        loop {
            let done = watched
                .iter()
                .all(|id| watcher.status(id).is_some_and(|s| s.is_terminal()));
            if done {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;

    println!();
    for id in &ids {
        print_status(&client, id);
    }

    let failed = ids
        .iter()
        .filter(|id| client.status(id).map(|s| s.status) == Some(StatusKind::Failed))
        .count();
    println!("\n{} succeeded, {} failed", ids.len() - failed, failed);
    Ok(())
}

fn print_status(client: &jobq_core::Client, id: &JobId) {
    match client.status(id) {
        Some(status) => match status.to_json() {
            Ok(json) => println!("{:>12}: {}", id, json),
            Err(e) => println!("{:>12}: <unprintable: {}>", id, e),
        },
        None => println!("{:>12}: evicted", id),
    }
}
