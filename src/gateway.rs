//! Synchronous task operations.
//!
//! The gateway composes the task store, the event publisher and the summary
//! cache. The store write is the durable record; publishing and invalidation
//! happen after it and never undo it.
//!
//! ```text
//! create:   store.create -> publish(task:created) -> invalidate summary
//! complete: store.complete -> invalidate summary
//! summary:  cache hit | store.counts -> cache.set(ttl)
//! ```

use std::sync::Arc;
use uuid::Uuid;

use crate::cache::{CacheError, ProcessedCounter, SummaryCache, SummarySnapshot};
use crate::events::{EventPublisher, TaskCreatedEvent, TASK_CREATED_TOPIC};
use crate::store::{SharedTaskStore, StoreError};
use crate::task::Task;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    Validation(String),

    #[error("Task {0} not found")]
    NotFound(String),

    #[error("Dependency failure: {0}")]
    Dependency(String),
}

impl From<StoreError> for GatewayError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => GatewayError::NotFound(id.to_string()),
            StoreError::Invalid(e) => GatewayError::Validation(e.to_string()),
            StoreError::Backend(msg) => GatewayError::Dependency(msg),
        }
    }
}

impl From<CacheError> for GatewayError {
    fn from(e: CacheError) -> Self {
        GatewayError::Dependency(e.to_string())
    }
}

#[derive(Clone)]
pub struct Gateway {
    store: SharedTaskStore,
    publisher: Arc<dyn EventPublisher>,
    summary: SummaryCache,
    counter: ProcessedCounter,
    page_size: usize,
}

impl Gateway {
    pub fn new(
        store: SharedTaskStore,
        publisher: Arc<dyn EventPublisher>,
        summary: SummaryCache,
        counter: ProcessedCounter,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            publisher,
            summary,
            counter,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Record a task, announce it, and drop the cached summary.
    pub async fn create_task(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Result<Task, GatewayError> {
        if title.trim().is_empty() {
            return Err(GatewayError::Validation("title is required".to_string()));
        }

        let task = self.store.create(title, description).await?;

        let event = TaskCreatedEvent {
            task_id: task.id,
            title: task.title.clone(),
        };
        match event.to_payload() {
            Ok(payload) => match self.publisher.publish(TASK_CREATED_TOPIC, payload).await {
                Ok(delivered) => {
                    tracing::debug!(task_id = %task.id, delivered, "Published task:created")
                }
                Err(e) => tracing::warn!(task_id = %task.id, "Failed to publish task:created: {}", e),
            },
            Err(e) => tracing::warn!(task_id = %task.id, "{}", e),
        }

        self.invalidate_summary(task.id).await;
        Ok(task)
    }

    /// Mark a task completed. An unknown id leaves the cache untouched.
    pub async fn complete_task(&self, id: Uuid) -> Result<Task, GatewayError> {
        let task = self.store.complete(id).await?;
        self.invalidate_summary(task.id).await;
        Ok(task)
    }

    /// Parse `raw` as a task id; anything unparseable is an unknown task.
    pub fn parse_task_id(raw: &str) -> Result<Uuid, GatewayError> {
        Uuid::parse_str(raw).map_err(|_| GatewayError::NotFound(raw.to_string()))
    }

    pub async fn get_task(&self, id: Uuid) -> Result<Task, GatewayError> {
        Ok(self.store.get(id).await?)
    }

    /// Most recent tasks, newest first. `limit` is clamped to the page size.
    pub async fn list_tasks(&self, limit: Option<usize>) -> Result<Vec<Task>, GatewayError> {
        let limit = limit.unwrap_or(self.page_size).clamp(1, self.page_size);
        Ok(self.store.list_recent(limit).await?)
    }

    /// Cached snapshot, recomputed from the store on a miss.
    pub async fn get_summary(&self) -> Result<SummarySnapshot, GatewayError> {
        match self.summary.load().await {
            Ok(Some(snapshot)) => return Ok(snapshot),
            Ok(None) => {}
            Err(e) => tracing::warn!("Summary cache read failed, recomputing: {}", e),
        }

        let snapshot = SummarySnapshot::from(self.store.counts().await?);
        if let Err(e) = self.summary.store(&snapshot).await {
            tracing::warn!("Failed to cache summary snapshot: {}", e);
        }
        Ok(snapshot)
    }

    pub async fn processed_count(&self) -> Result<i64, GatewayError> {
        Ok(self.counter.current().await?)
    }

    async fn invalidate_summary(&self, task_id: Uuid) {
        if let Err(e) = self.summary.invalidate().await {
            // The write already succeeded; the TTL bounds how stale this gets.
            tracing::warn!(%task_id, "Failed to invalidate summary cache: {}", e);
        }
    }
}
