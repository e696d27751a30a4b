//! Shared key/value cache.
//!
//! Holds the summary snapshot (JSON, with a TTL) and the processed counter
//! (integer, no TTL). The cache is never authoritative; the task store is.

mod memory;
mod summary;

pub use memory::InMemoryCache;
pub use summary::{ProcessedCounter, SummaryCache, SummarySnapshot};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Key of the cached aggregate snapshot.
pub const SUMMARY_KEY: &str = "tasks:summary";

/// Key of the processed-events counter.
pub const PROCESSED_KEY: &str = "stats:tasks_processed";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Value at {0} is not an integer")]
    NotAnInteger(String),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Cache: Send + Sync {
    /// Current value, or `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value`, replacing any previous entry. `ttl: None` never expires.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Atomically add one to the integer at `key` (absent counts as 0) and
    /// return the new value. An existing expiry is kept.
    async fn incr(&self, key: &str) -> Result<i64, CacheError>;
}

pub type SharedCache = Arc<dyn Cache>;
