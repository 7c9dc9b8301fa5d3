// src/events.rs
//
// Downstream notification seam. The pipeline publishes one event per
// completed run; any at-least-once transport can sit behind the trait.

use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::models::core::{OfferId, RecordId};
use crate::models::matching::MergeGroup;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DedupEvent {
    RunCompleted {
        run_id: String,
        batch_id: String,
        merged_groups: Vec<MergeGroup>,
        invalidated_offer_ids: Vec<OfferId>,
        needs_review_ids: Vec<RecordId>,
    },
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DedupEvent) -> anyhow::Result<()>;
}

/// Default publisher: serializes the payload into the run log. Suits
/// deployments where a log shipper is the transport.
pub struct LogEventPublisher;

#[async_trait]
impl EventPublisher for LogEventPublisher {
    async fn publish(&self, event: &DedupEvent) -> anyhow::Result<()> {
        match serde_json::to_string(event) {
            Ok(payload) => info!("📨 Event published: {}", payload),
            Err(e) => warn!("Failed to serialize event for logging: {}", e),
        }
        Ok(())
    }
}

/// Buffers published events in memory; used by tests and local tooling to
/// assert on what a run emitted.
#[derive(Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<DedupEvent>>,
}

impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<DedupEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(&self, event: &DedupEvent) -> anyhow::Result<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_completed_serializes_with_type_tag() {
        let event = DedupEvent::RunCompleted {
            run_id: "run-1".into(),
            batch_id: "batch-1".into(),
            merged_groups: vec![MergeGroup {
                survivor_id: RecordId("a".into()),
                merged_ids: vec![RecordId("b".into())],
            }],
            invalidated_offer_ids: vec![OfferId("o1".into())],
            needs_review_ids: vec![],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "run_completed");
        assert_eq!(json["merged_groups"][0]["survivor_id"], "a");
        assert_eq!(json["invalidated_offer_ids"][0], "o1");
    }
}
