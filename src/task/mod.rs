//! Task module - the tracked unit of work and its lifecycle.
//!
//! Invariants enforced here and relied upon by every store backend:
//! - `status` only moves `Pending -> Completed`
//! - `completed_at.is_some() == (status == Completed)`
//! - `created_at <= completed_at`

pub mod task;

pub use task::{Task, TaskCounts, TaskError, TaskStatus};
