//! Enrichment step run for every task-created event.

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::time::Duration;

use crate::config::EnrichConfig;
use crate::events::TaskCreatedEvent;
use crate::util::timestamp_string;

#[derive(Debug, thiserror::Error)]
#[error("Enrichment failed: {0}")]
pub struct EnrichError(pub String);

/// Produces the text appended to a task's description.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, event: &TaskCreatedEvent) -> Result<String, EnrichError>;
}

/// Marker appended by the consumer.
pub fn processed_marker() -> String {
    format!("\n[worker] Processed at {}", timestamp_string(Utc::now()))
}

/// Stands in for a call to an external system: waits a base delay plus a
/// random jitter, then returns the processed marker.
pub struct SimulatedEnricher {
    base_delay: Duration,
    jitter: Duration,
}

impl SimulatedEnricher {
    pub fn new(config: &EnrichConfig) -> Self {
        Self {
            base_delay: config.base_delay,
            jitter: config.jitter,
        }
    }

    fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.base_delay + Duration::from_millis(extra)
    }
}

#[async_trait]
impl Enricher for SimulatedEnricher {
    async fn enrich(&self, event: &TaskCreatedEvent) -> Result<String, EnrichError> {
        let delay = self.next_delay();
        tracing::debug!(task_id = %event.task_id, "Enriching for {:?}", delay);
        tokio::time::sleep(delay).await;
        Ok(processed_marker())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn delay_stays_within_jitter_window() {
        let enricher = SimulatedEnricher::new(&EnrichConfig {
            base_delay: Duration::from_millis(100),
            jitter: Duration::from_millis(50),
        });
        for _ in 0..100 {
            let delay = enricher.next_delay();
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn marker_has_worker_prefix() {
        assert!(processed_marker().starts_with("\n[worker] Processed at "));
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_enricher_waits_then_returns_marker() {
        let enricher = SimulatedEnricher::new(&EnrichConfig {
            base_delay: Duration::from_millis(500),
            jitter: Duration::ZERO,
        });
        let event = TaskCreatedEvent {
            task_id: Uuid::new_v4(),
            title: "A".to_string(),
        };
        let started = tokio::time::Instant::now();
        let marker = enricher.enrich(&event).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert!(marker.contains("[worker] Processed at"));
    }
}
