//! In-memory task store (non-persistent).

use super::{StoreError, TaskStore};
use crate::task::{Task, TaskCounts, TaskStatus};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    /// Task plus its insertion sequence, used to order same-instant creations.
    tasks: HashMap<Uuid, (u64, Task)>,
    next_seq: u64,
}

#[derive(Clone, Default)]
pub struct InMemoryTaskStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    fn is_persistent(&self) -> bool {
        false
    }

    async fn create(&self, title: &str, description: Option<&str>) -> Result<Task, StoreError> {
        let task = Task::new(title, description)?;
        let mut inner = self.inner.write().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.tasks.insert(task.id, (seq, task.clone()));
        Ok(task)
    }

    async fn get(&self, id: Uuid) -> Result<Task, StoreError> {
        self.inner
            .read()
            .await
            .tasks
            .get(&id)
            .map(|(_, task)| task.clone())
            .ok_or(StoreError::NotFound(id))
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Task>, StoreError> {
        let inner = self.inner.read().await;
        let mut entries: Vec<&(u64, Task)> = inner.tasks.values().collect();
        entries.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at.cmp(&a.created_at).then(seq_b.cmp(seq_a))
        });
        Ok(entries
            .into_iter()
            .take(limit)
            .map(|(_, task)| task.clone())
            .collect())
    }

    async fn complete(&self, id: Uuid) -> Result<Task, StoreError> {
        let mut inner = self.inner.write().await;
        let (_, task) = inner.tasks.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        task.complete(Utc::now());
        Ok(task.clone())
    }

    async fn append_description(&self, id: Uuid, text: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let (_, task) = inner.tasks.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        task.append_description(text);
        Ok(())
    }

    async fn counts(&self) -> Result<TaskCounts, StoreError> {
        let inner = self.inner.read().await;
        let completed = inner
            .tasks
            .values()
            .filter(|(_, t)| t.status == TaskStatus::Completed)
            .count() as u64;
        let pending = inner.tasks.len() as u64 - completed;
        Ok(TaskCounts::from_parts(completed, pending))
    }
}
