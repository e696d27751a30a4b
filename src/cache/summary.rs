//! Read-through summary snapshot and the processed counter.
//!
//! The snapshot is filled lazily by whoever misses first and deleted by every
//! task mutation. Concurrent misses each recompute and each write; the last
//! write wins. Staleness is bounded by the TTL plus invalidation-on-write.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{CacheError, SharedCache, PROCESSED_KEY, SUMMARY_KEY};
use crate::task::TaskCounts;

/// Cached aggregate task counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarySnapshot {
    pub total: u64,
    pub completed: u64,
    pub pending: u64,
}

impl From<TaskCounts> for SummarySnapshot {
    fn from(counts: TaskCounts) -> Self {
        Self {
            total: counts.total,
            completed: counts.completed,
            pending: counts.pending,
        }
    }
}

#[derive(Clone)]
pub struct SummaryCache {
    cache: SharedCache,
    ttl: Duration,
}

impl SummaryCache {
    pub fn new(cache: SharedCache, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Cached snapshot, or `None` on a miss. An undecodable entry counts as a
    /// miss so the next recompute overwrites it.
    pub async fn load(&self) -> Result<Option<SummarySnapshot>, CacheError> {
        let Some(raw) = self.cache.get(SUMMARY_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                tracing::warn!("Discarding undecodable summary snapshot: {}", e);
                Ok(None)
            }
        }
    }

    pub async fn store(&self, snapshot: &SummarySnapshot) -> Result<(), CacheError> {
        let raw = serde_json::to_string(snapshot)
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        self.cache.set(SUMMARY_KEY, raw, Some(self.ttl)).await
    }

    pub async fn invalidate(&self) -> Result<(), CacheError> {
        self.cache.delete(SUMMARY_KEY).await
    }
}

/// Count of task-created events the consumer finished handling.
#[derive(Clone)]
pub struct ProcessedCounter {
    cache: SharedCache,
}

impl ProcessedCounter {
    pub fn new(cache: SharedCache) -> Self {
        Self { cache }
    }

    pub async fn increment(&self) -> Result<i64, CacheError> {
        self.cache.incr(PROCESSED_KEY).await
    }

    /// Current value; `0` if nothing has been processed yet.
    pub async fn current(&self) -> Result<i64, CacheError> {
        match self.cache.get(PROCESSED_KEY).await? {
            Some(raw) => raw
                .parse()
                .map_err(|_| CacheError::NotAnInteger(PROCESSED_KEY.to_string())),
            None => Ok(0),
        }
    }
}
