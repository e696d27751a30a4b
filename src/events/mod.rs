//! Task event dispatch.
//!
//! Two deliberately separate mechanisms carry task-created notifications:
//! - [`BroadcastChannel`]: best-effort fan-out. Every subscriber attached at
//!   publish time receives the message once; with no subscriber the message
//!   is dropped. No persistence, no acknowledgment, no replay.
//! - [`InMemoryWorkQueue`]: work distribution. Each message goes to exactly one
//!   attached worker and waits in the queue while no worker is attached.
//!
//! Publishers and consumers only see the [`EventPublisher`] and
//! [`MessageStream`] seams, so [`Dispatch`] can swap one for the other.

mod broadcast;
mod queue;

pub use broadcast::{BroadcastChannel, Subscription};
pub use queue::{InMemoryWorkQueue, QueueWorker};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::DispatchMode;

/// Topic carrying [`TaskCreatedEvent`] payloads.
pub const TASK_CREATED_TOPIC: &str = "task:created";

/// Notification that a task was committed to the store. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreatedEvent {
    pub task_id: Uuid,
    pub title: String,
}

impl TaskCreatedEvent {
    pub fn to_payload(&self) -> Result<String, ChannelError> {
        serde_json::to_string(self).map_err(|e| ChannelError::Encode(e.to_string()))
    }

    pub fn from_payload(payload: &str) -> Result<Self, ChannelError> {
        serde_json::from_str(payload).map_err(|e| ChannelError::Decode(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Event channel is closed")]
    Closed,

    #[error("Failed to encode event: {0}")]
    Encode(String),

    #[error("Failed to decode event: {0}")]
    Decode(String),
}

/// Hands a payload to the transport without waiting for delivery.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Returns how many deliveries the message was handed off for. For the
    /// broadcast channel this is the subscriber count at publish time, so `0`
    /// means the message was lost.
    async fn publish(&self, topic: &str, payload: String) -> Result<usize, ChannelError>;
}

/// Push-based stream of payloads for one topic. `None` means the transport
/// shut down.
#[async_trait]
pub trait MessageStream: Send {
    async fn next_message(&mut self) -> Option<String>;
}

/// Dispatch mechanism selected at startup.
#[derive(Clone)]
pub enum Dispatch {
    Broadcast(Arc<BroadcastChannel>),
    Queue(Arc<InMemoryWorkQueue>),
}

impl Dispatch {
    pub fn new(mode: DispatchMode) -> Self {
        match mode {
            DispatchMode::Broadcast => Self::Broadcast(Arc::new(BroadcastChannel::new())),
            DispatchMode::Queue => Self::Queue(Arc::new(InMemoryWorkQueue::new())),
        }
    }

    pub fn publisher(&self) -> Arc<dyn EventPublisher> {
        match self {
            Self::Broadcast(channel) => channel.clone(),
            Self::Queue(queue) => queue.clone(),
        }
    }

    /// Attach a new receiver to `topic`.
    pub fn attach(&self, topic: &str) -> Box<dyn MessageStream> {
        match self {
            Self::Broadcast(channel) => Box::new(channel.subscribe(topic)),
            Self::Queue(queue) => Box::new(queue.worker(topic)),
        }
    }

    /// Close the transport; attached streams end once drained.
    pub fn close(&self) {
        match self {
            Self::Broadcast(channel) => channel.close(),
            Self::Queue(queue) => queue.close(),
        }
    }
}
