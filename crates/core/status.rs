//! Job status model and the bounded status cache.
//!
//! The cache keeps the most recent [`Status`] per job id in arrival order.
//! When it is full, the oldest entry is evicted to make room. Lookups are a
//! linear scan: the cache is expected to hold hundreds of entries, not
//! millions.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::Result;
use crate::job::{JobId, JobOutput};

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    /// Accepted by a client, waiting for a worker.
    #[default]
    Queued,
    /// Currently executing.
    Running,
    /// Body returned an error.
    Failed,
    /// Body returned successfully.
    Succeeded,
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusKind::Queued => write!(f, "queued"),
            StatusKind::Running => write!(f, "running"),
            StatusKind::Failed => write!(f, "failed"),
            StatusKind::Succeeded => write!(f, "succeeded"),
        }
    }
}

/// The latest known state of a job, with its output and error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub status: StatusKind,
    #[serde(default)]
    pub result: JobOutput,
    /// Error message, empty unless `status` is `Failed`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub err: String,
}

impl Status {
    /// Status of a job that was accepted but not picked up yet.
    pub fn queued() -> Self {
        Self {
            status: StatusKind::Queued,
            ..Default::default()
        }
    }

    /// Status of a job whose body is executing.
    pub fn running() -> Self {
        Self {
            status: StatusKind::Running,
            ..Default::default()
        }
    }

    /// Status of a job that finished with `result`.
    pub fn succeeded(result: JobOutput) -> Self {
        Self {
            status: StatusKind::Succeeded,
            result,
            err: String::new(),
        }
    }

    /// Status of a job that failed with `err`, keeping any partial output.
    pub fn failed(result: JobOutput, err: impl Into<String>) -> Self {
        Self {
            status: StatusKind::Failed,
            result,
            err: err.into(),
        }
    }

    /// Whether the job has reached `Succeeded` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, StatusKind::Succeeded | StatusKind::Failed)
    }

    /// Serialize the status to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize a status from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    id: JobId,
    status: Status,
}

/// Bounded store of the most recent status per job id.
///
/// Entries are ordered by arrival, not by id. Writing an id that is already
/// present replaces its status in place without moving it.
#[derive(Debug)]
pub struct StatusCache {
    capacity: usize,
    entries: RwLock<VecDeque<CacheEntry>>,
}

impl StatusCache {
    /// Create a cache holding at most `capacity` statuses.
    ///
    /// A capacity of zero yields a cache that ignores every write.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Maximum number of statuses kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record `status` as the latest status for `id`.
    pub fn set_status(&self, id: &JobId, status: Status) {
        if self.capacity == 0 {
            tracing::warn!(job_id = %id, "Status cache has no capacity, dropping status");
            return;
        }

        let mut entries = self.entries.write();
        if let Some(entry) = entries.iter_mut().find(|e| e.id == *id) {
            entry.status = status;
            return;
        }

        // Evict before pushing so the deque never grows past capacity.
        while entries.len() >= self.capacity {
            if let Some(evicted) = entries.pop_front() {
                tracing::trace!(job_id = %evicted.id, "Evicted status");
            }
        }
        entries.push_back(CacheEntry {
            id: id.clone(),
            status,
        });
    }

    /// Get the latest status for `id`, if it is still cached.
    pub fn status(&self, id: &JobId) -> Option<Status> {
        self.entries
            .read()
            .iter()
            .find(|e| e.id == *id)
            .map(|e| e.status.clone())
    }

    /// Number of statuses currently cached.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no status is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn id(s: &str) -> JobId {
        JobId::from(s)
    }

    #[test]
    fn test_evicts_oldest_when_full() {
        let cache = StatusCache::new(2);
        cache.set_status(&id("1"), Status::running());
        cache.set_status(&id("2"), Status::running());
        cache.set_status(&id("3"), Status::running());

        assert!(cache.status(&id("1")).is_none());
        assert!(cache.status(&id("2")).is_some());
        assert!(cache.status(&id("3")).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_update_in_place_does_not_duplicate() {
        let cache = StatusCache::new(2);
        cache.set_status(&id("1"), Status::running());
        cache.set_status(&id("1"), Status::succeeded(JobOutput::revision("r1")));
        cache.set_status(&id("2"), Status::running());

        assert_eq!(cache.len(), 2);
        let one = cache.status(&id("1")).unwrap();
        assert_eq!(one.status, StatusKind::Succeeded);
        assert_eq!(one.result.revision, "r1");
        assert_eq!(cache.status(&id("2")).unwrap().status, StatusKind::Running);
    }

    #[test]
    fn test_update_keeps_position() {
        let cache = StatusCache::new(2);
        cache.set_status(&id("1"), Status::running());
        cache.set_status(&id("2"), Status::running());
        // Rewriting 1 does not move it behind 2.
        cache.set_status(&id("1"), Status::succeeded(JobOutput::default()));
        cache.set_status(&id("3"), Status::running());

        assert!(cache.status(&id("1")).is_none());
        assert!(cache.status(&id("2")).is_some());
        assert!(cache.status(&id("3")).is_some());
    }

    #[test]
    fn test_zero_capacity_is_noop() {
        let cache = StatusCache::new(0);
        cache.set_status(&id("1"), Status::running());
        assert!(cache.status(&id("1")).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_missing_id() {
        let cache = StatusCache::new(4);
        assert_eq!(cache.status(&id("nope")), None);
    }

    #[test]
    fn test_capacity_one() {
        let cache = StatusCache::new(1);
        cache.set_status(&id("a"), Status::running());
        cache.set_status(&id("b"), Status::queued());
        assert!(cache.status(&id("a")).is_none());
        assert_eq!(cache.status(&id("b")), Some(Status::queued()));
        assert_eq!(cache.capacity(), 1);
    }

    #[test]
    fn test_concurrent_writers_stay_bounded() {
        let cache = Arc::new(StatusCache::new(16));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let job = JobId::new(format!("{}-{}", t, i));
                        cache.set_status(&job, Status::running());
                        let _ = cache.status(&job);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 16);
    }

    #[test]
    fn test_status_kind_display() {
        assert_eq!(StatusKind::Queued.to_string(), "queued");
        assert_eq!(StatusKind::Running.to_string(), "running");
        assert_eq!(StatusKind::Failed.to_string(), "failed");
        assert_eq!(StatusKind::Succeeded.to_string(), "succeeded");
    }

    #[test]
    fn test_status_json_shape() {
        let json = Status::failed(JobOutput::revision("r2"), "boom")
            .to_json()
            .unwrap();
        assert_eq!(
            json,
            r#"{"status":"failed","result":{"revision":"r2"},"err":"boom"}"#
        );

        let json = Status::running().to_json().unwrap();
        assert_eq!(json, r#"{"status":"running","result":{}}"#);
    }

    #[test]
    fn test_status_from_json() {
        let status = Status::from_json(r#"{"status":"succeeded","result":{"revision":"abc"}}"#)
            .unwrap();
        assert_eq!(status, Status::succeeded(JobOutput::revision("abc")));
        assert!(status.is_terminal());

        assert!(Status::from_json("not json").is_err());
    }
}
