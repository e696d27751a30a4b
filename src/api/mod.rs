//! HTTP API for the task pipeline.
//!
//! ## Endpoints
//!
//! - `GET /health` (also `/healthz`) - Health check
//! - `GET /api/tasks` - Most recent tasks, newest first (`?limit=` up to the page size)
//! - `POST /api/tasks` - Create a task
//! - `GET /api/tasks/summary` - Cached `{total, completed, pending}` counts
//! - `GET /api/tasks/{id}` - Get one task
//! - `PATCH /api/tasks/{id}/complete` - Mark a task completed
//! - `GET /api/stats` - Processed-event counter

mod routes;
pub mod types;

pub use routes::{router, serve, AppState};
pub use types::*;
