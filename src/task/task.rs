//! Core Task type.
//!
//! # Invariants
//! - `id` is unique and never reused
//! - `title` is non-empty after trimming
//! - `completed_at.is_some()` if and only if `status == Completed`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::truncate_to_micros;

/// Status of a task in its lifecycle.
///
/// # State Machine
/// ```text
/// Pending -> Completed
/// ```
/// The transition is one-way; nothing moves a task back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task has been recorded and not yet completed
    Pending,
    /// Task was marked complete
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Completed => "completed",
        }
    }

    /// Parse the stored representation. Unknown values map to `Pending`.
    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => TaskStatus::Completed,
            _ => TaskStatus::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    /// Free text; the enrichment consumer appends to it.
    pub description: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new pending task.
    ///
    /// # Postconditions
    /// - `status == Pending`, `completed_at == None`
    /// - `created_at` is the current time (microsecond precision)
    ///
    /// # Errors
    /// Returns `TaskError::EmptyTitle` if `title` is blank.
    pub fn new(title: &str, description: Option<&str>) -> Result<Self, TaskError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(TaskError::EmptyTitle);
        }

        Ok(Self {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: description.unwrap_or_default().to_string(),
            status: TaskStatus::Pending,
            created_at: truncate_to_micros(Utc::now()),
            completed_at: None,
        })
    }

    /// Transition to `Completed` at `now`.
    ///
    /// Completing an already-completed task is a no-op: the first
    /// `completed_at` is kept. Returns whether the status changed.
    ///
    /// # Postcondition
    /// `created_at <= completed_at`
    pub fn complete(&mut self, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TaskStatus::Completed;
        self.completed_at = Some(truncate_to_micros(now.max(self.created_at)));
        true
    }

    pub fn append_description(&mut self, text: &str) {
        self.description.push_str(text);
    }
}

/// Aggregate task counts.
///
/// # Invariant
/// `total == completed + pending`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub total: u64,
    pub completed: u64,
    pub pending: u64,
}

impl TaskCounts {
    pub fn from_parts(completed: u64, pending: u64) -> Self {
        Self {
            total: completed + pending,
            completed,
            pending,
        }
    }
}

/// Errors that can occur when constructing a task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("Task title cannot be empty")]
    EmptyTitle,
}
