//! Best-effort broadcast channel.
//!
//! Delivery is at-most-once and only to subscribers attached at publish time.
//! A subscriber that falls more than [`TOPIC_BUFFER`] messages behind skips
//! the overflow.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use tokio::sync::broadcast;

use super::{ChannelError, EventPublisher, MessageStream};

/// Per-topic buffer for subscribers that have not yet received a message.
const TOPIC_BUFFER: usize = 1024;

pub struct BroadcastChannel {
    topics: RwLock<HashMap<String, broadcast::Sender<String>>>,
    closed: AtomicBool,
}

impl BroadcastChannel {
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Attach a listener to `topic`. Only messages published after this call
    /// are seen.
    pub fn subscribe(&self, topic: &str) -> Subscription {
        if self.closed.load(Ordering::Acquire) {
            // Sender dropped immediately: the stream ends on first poll.
            let (_, rx) = broadcast::channel(1);
            return Subscription::new(topic, rx);
        }

        let mut topics = self.topics.write().unwrap_or_else(|e| e.into_inner());
        let rx = topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_BUFFER).0)
            .subscribe();
        tracing::debug!(topic, "Subscriber attached");
        Subscription::new(topic, rx)
    }

    /// Number of listeners currently attached to `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(topic)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Drop every topic sender, ending all subscriptions.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.topics
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl Default for BroadcastChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for BroadcastChannel {
    async fn publish(&self, topic: &str, payload: String) -> Result<usize, ChannelError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ChannelError::Closed);
        }

        let topics = self.topics.read().unwrap_or_else(|e| e.into_inner());
        let delivered = match topics.get(topic) {
            // `send` only fails when no receiver is attached.
            Some(tx) => tx.send(payload).unwrap_or(0),
            None => 0,
        };
        if delivered == 0 {
            tracing::debug!(topic, "Published with no subscribers; message dropped");
        }
        Ok(delivered)
    }
}

/// Receiving side of a broadcast topic. Dropping it unsubscribes.
pub struct Subscription {
    topic: String,
    rx: broadcast::Receiver<String>,
}

impl Subscription {
    fn new(topic: &str, rx: broadcast::Receiver<String>) -> Self {
        Self {
            topic: topic.to_string(),
            rx,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl MessageStream for Subscription {
    async fn next_message(&mut self) -> Option<String> {
        loop {
            match self.rx.recv().await {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(topic = %self.topic, "Subscriber lagged; {} messages skipped", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!(topic = %self.topic, "Broadcast channel closed");
                    return None;
                }
            }
        }
    }
}
