//! Configuration types for the job queue library.

use std::time::Duration;

use crate::executor::DEFAULT_JOB_TIMEOUT;

/// Default number of statuses kept by the status cache.
pub const DEFAULT_STATUS_CACHE_SIZE: usize = 1000;

/// Configuration for the WorkerPool.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of worker tasks to spawn.
    pub num_workers: usize,
    /// Budget handed to each job body as its expiry signal.
    pub job_timeout: Duration,
    /// Number of job statuses to remember. Zero disables status tracking.
    pub status_cache_size: usize,
    /// How long shutdown waits for in-flight jobs.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            job_timeout: DEFAULT_JOB_TIMEOUT,
            status_cache_size: DEFAULT_STATUS_CACHE_SIZE,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Builder for WorkerConfig.
#[derive(Debug, Default)]
pub struct WorkerConfigBuilder {
    config: WorkerConfig,
}

impl WorkerConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of workers.
    pub fn num_workers(mut self, num: usize) -> Self {
        self.config.num_workers = num;
        self
    }

    /// Set the job timeout.
    pub fn job_timeout(mut self, timeout: Duration) -> Self {
        self.config.job_timeout = timeout;
        self
    }

    /// Set the status cache size.
    pub fn status_cache_size(mut self, size: usize) -> Self {
        self.config.status_cache_size = size;
        self
    }

    /// Set the graceful shutdown timeout.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Build the WorkerConfig.
    pub fn build(self) -> WorkerConfig {
        self.config
    }
}

impl WorkerConfig {
    /// Create a new builder.
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.job_timeout, Duration::from_secs(60));
        assert_eq!(config.status_cache_size, 1000);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_builder_overrides() {
        let config = WorkerConfig::builder()
            .num_workers(2)
            .job_timeout(Duration::from_secs(5))
            .status_cache_size(10)
            .shutdown_timeout(Duration::from_millis(250))
            .build();
        assert_eq!(config.num_workers, 2);
        assert_eq!(config.job_timeout, Duration::from_secs(5));
        assert_eq!(config.status_cache_size, 10);
        assert_eq!(config.shutdown_timeout, Duration::from_millis(250));
    }
}
