//! Task storage module with pluggable backends.
//!
//! Supports:
//! - `memory`: In-memory storage (non-persistent, for testing)
//! - `sqlite`: SQLite database, the durable record of truth

mod memory;
mod sqlite;

pub use memory::InMemoryTaskStore;
pub use sqlite::SqliteTaskStore;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::task::{Task, TaskCounts, TaskError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Task {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Invalid(#[from] TaskError),

    #[error("Task store error: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        StoreError::Backend(format!("Task join error: {}", e))
    }
}

/// Task store trait - implemented by all storage backends.
///
/// Every operation is atomic for the single row it touches; nothing spans
/// rows.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Whether this store persists data across restarts.
    fn is_persistent(&self) -> bool;

    /// Record a new pending task.
    async fn create(&self, title: &str, description: Option<&str>) -> Result<Task, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Task, StoreError>;

    /// List up to `limit` tasks, newest `created_at` first. Tasks created in
    /// the same instant are ordered by insertion, latest first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<Task>, StoreError>;

    /// Mark a task completed. Completing an already-completed task leaves it
    /// unchanged and returns it.
    async fn complete(&self, id: Uuid) -> Result<Task, StoreError>;

    /// Concatenate `text` onto the task's description.
    async fn append_description(&self, id: Uuid, text: &str) -> Result<(), StoreError>;

    /// Total, completed and pending counts.
    async fn counts(&self) -> Result<TaskCounts, StoreError>;
}

pub type SharedTaskStore = Arc<dyn TaskStore>;

/// Task store type selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStoreType {
    Memory,
    Sqlite(PathBuf),
}

impl TaskStoreType {
    /// Parse from a connection string.
    ///
    /// `memory` / `memory://` select the in-memory store; `sqlite://<path>`,
    /// `sqlite:<path>` or a bare path select SQLite.
    pub fn from_url(url: &str) -> Self {
        let url = url.trim();
        if url.eq_ignore_ascii_case("memory") || url.starts_with("memory:") {
            return Self::Memory;
        }
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        Self::Sqlite(PathBuf::from(path))
    }
}

/// Create a task store based on type.
pub async fn create_task_store(store_type: TaskStoreType) -> Result<SharedTaskStore, StoreError> {
    match store_type {
        TaskStoreType::Memory => Ok(Arc::new(InMemoryTaskStore::new())),
        TaskStoreType::Sqlite(path) => {
            let store = SqliteTaskStore::open(path).await?;
            Ok(Arc::new(store))
        }
    }
}
