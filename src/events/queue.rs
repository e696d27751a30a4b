//! In-memory work queue with competing consumers.
//!
//! Each topic is a FIFO shared by all of its workers; a payload is handed to
//! whichever worker asks first and to no one else. Unlike the broadcast
//! channel, payloads enqueued while no worker is attached wait for one.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::{ChannelError, EventPublisher, MessageStream};

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>>;

struct TopicQueue {
    tx: mpsc::UnboundedSender<String>,
    rx: SharedReceiver,
}

impl TopicQueue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
        }
    }
}

pub struct InMemoryWorkQueue {
    topics: Mutex<HashMap<String, TopicQueue>>,
    closed: AtomicBool,
}

impl InMemoryWorkQueue {
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Attach a worker to `topic`'s consumer group.
    pub fn worker(&self, topic: &str) -> QueueWorker {
        if self.closed.load(Ordering::Acquire) {
            let (_, rx) = mpsc::unbounded_channel();
            return QueueWorker {
                rx: Arc::new(tokio::sync::Mutex::new(rx)),
            };
        }

        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        let queue = topics
            .entry(topic.to_string())
            .or_insert_with(TopicQueue::new);
        QueueWorker {
            rx: queue.rx.clone(),
        }
    }

    /// Stop accepting work. Workers drain what is already queued, then end.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.topics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl Default for InMemoryWorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryWorkQueue {
    async fn publish(&self, topic: &str, payload: String) -> Result<usize, ChannelError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ChannelError::Closed);
        }

        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        let queue = topics
            .entry(topic.to_string())
            .or_insert_with(TopicQueue::new);
        queue.tx.send(payload).map_err(|_| ChannelError::Closed)?;
        Ok(1)
    }
}

/// One member of a topic's consumer group.
pub struct QueueWorker {
    rx: SharedReceiver,
}

#[async_trait]
impl MessageStream for QueueWorker {
    async fn next_message(&mut self) -> Option<String> {
        self.rx.lock().await.recv().await
    }
}
