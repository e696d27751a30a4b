//! # Task Pipeline
//!
//! Task tracking service with a synchronous gateway and an asynchronous
//! enrichment consumer.
//!
//! ## Architecture
//!
//! ```text
//!   client ──► Gateway ──► TaskStore (durable write)
//!                 │
//!                 ├──► EventPublisher ── task:created ──► Consumer ──► TaskStore (append)
//!                 │      (fire-and-forget)                   │
//!                 └──► SummaryCache (invalidate)             └──► processed counter
//! ```
//!
//! ## Guarantees
//! - The task store is the only source of truth; cache and events are derived.
//! - Broadcast delivery is at-most-once and only to subscribers attached at
//!   publish time. A message published with no subscriber is lost.
//! - The summary snapshot may be stale for at most its TTL, and is dropped on
//!   every mutation made through the gateway.
//!
//! ## Modules
//! - `api`: HTTP routes and server startup
//! - `gateway`: create/list/complete/summary operations
//! - `store`: task store trait with memory and SQLite backends
//! - `events`: broadcast channel and work queue
//! - `cache`: key/value cache, summary snapshot, processed counter
//! - `consumer`: enrichment receive loop

pub mod api;
pub mod cache;
pub mod config;
pub mod consumer;
pub mod events;
pub mod gateway;
pub mod store;
pub mod task;
pub mod util;

pub use config::Config;
pub use gateway::{Gateway, GatewayError};
pub use task::{Task, TaskStatus};
