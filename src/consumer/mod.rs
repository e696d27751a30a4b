//! Asynchronous task enrichment consumer.
//!
//! # State Machine
//! ```text
//! Subscribed -> (Enriching -> Updating -> Idle)* -> Stopped
//! ```
//! `Idle` means waiting for the next message after one was handled.
//! `Stopped` is reached when the shutdown token fires or the stream ends.
//!
//! Messages are handled one at a time in delivery order. A failed message is
//! logged and dropped: no retry, no dead-letter queue. Shutdown does not wait
//! for in-flight work; an interrupted message is simply lost.

mod enrich;

pub use enrich::{processed_marker, EnrichError, Enricher, SimulatedEnricher};

use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cache::{CacheError, ProcessedCounter};
use crate::events::{ChannelError, Dispatch, MessageStream, TaskCreatedEvent, TASK_CREATED_TOPIC};
use crate::store::{SharedTaskStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Subscribed,
    Enriching,
    Updating,
    Stopped,
}

#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error(transparent)]
    Decode(#[from] ChannelError),

    #[error(transparent)]
    Enrich(#[from] EnrichError),

    #[error("Failed to update task {task_id}: {source}")]
    Store {
        task_id: Uuid,
        #[source]
        source: StoreError,
    },

    #[error("Failed to bump processed counter for task {task_id}: {source}")]
    Counter {
        task_id: Uuid,
        #[source]
        source: CacheError,
    },
}

/// Totals reported when the receive loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerReport {
    pub handled: u64,
    pub failed: u64,
}

pub struct Consumer {
    stream: Box<dyn MessageStream>,
    handler: Handler,
}

/// Per-message work, kept apart from the stream so it can be borrowed while
/// the stream is not.
struct Handler {
    store: SharedTaskStore,
    counter: ProcessedCounter,
    enricher: Arc<dyn Enricher>,
    state_tx: watch::Sender<ConsumerState>,
}

impl Consumer {
    /// Attach to the task-created topic. Messages published before this call
    /// are never seen through a broadcast dispatch.
    pub fn subscribe(
        dispatch: &Dispatch,
        store: SharedTaskStore,
        counter: ProcessedCounter,
        enricher: Arc<dyn Enricher>,
    ) -> Self {
        let stream = dispatch.attach(TASK_CREATED_TOPIC);
        let (state_tx, _) = watch::channel(ConsumerState::Subscribed);
        tracing::info!("Subscribed to {}", TASK_CREATED_TOPIC);
        Self {
            stream,
            handler: Handler {
                store,
                counter,
                enricher,
                state_tx,
            },
        }
    }

    /// Observe state transitions.
    pub fn state(&self) -> watch::Receiver<ConsumerState> {
        self.handler.state_tx.subscribe()
    }

    /// Receive loop. Returns once `shutdown` fires or the stream closes.
    pub async fn run(mut self, shutdown: CancellationToken) -> ConsumerReport {
        let mut report = ConsumerReport::default();

        loop {
            let payload = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = self.stream.next_message() => match next {
                    Some(payload) => payload,
                    None => break,
                },
            };

            let outcome = tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::warn!("Shutdown during processing; in-flight message abandoned");
                    break;
                }
                outcome = self.handler.handle(&payload) => outcome,
            };

            match outcome {
                Ok(task_id) => {
                    report.handled += 1;
                    tracing::info!(%task_id, "Task processed");
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!("Error processing message: {}", e);
                }
            }
            self.handler.state_tx.send_replace(ConsumerState::Idle);
        }

        // Dropping the stream unsubscribes.
        drop(self.stream);
        self.handler.state_tx.send_replace(ConsumerState::Stopped);
        tracing::info!(
            handled = report.handled,
            failed = report.failed,
            "Consumer stopped"
        );
        report
    }
}

impl Handler {
    /// Enrich one event, append the marker, bump the counter.
    async fn handle(&self, payload: &str) -> Result<Uuid, ConsumerError> {
        self.state_tx.send_replace(ConsumerState::Enriching);
        let event = TaskCreatedEvent::from_payload(payload)?;
        tracing::info!(task_id = %event.task_id, "Processing new task: {}", event.title);

        let marker = self.enricher.enrich(&event).await?;

        self.state_tx.send_replace(ConsumerState::Updating);
        self.store
            .append_description(event.task_id, &marker)
            .await
            .map_err(|source| ConsumerError::Store {
                task_id: event.task_id,
                source,
            })?;

        self.counter
            .increment()
            .await
            .map_err(|source| ConsumerError::Counter {
                task_id: event.task_id,
                source,
            })?;

        Ok(event.task_id)
    }
}
