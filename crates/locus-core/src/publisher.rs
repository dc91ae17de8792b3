//! Event publisher seam.
//!
//! The detector hands each derived [`TransitionEvent`] to an
//! [`EventPublisher`] exactly once per genuine transition. Durable delivery
//! is the publisher's business; a failed call is reported back so the
//! caller can re-drive the undelivered events.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use locus_types::{EntityId, TransitionEvent};
use tokio::sync::Mutex;

/// Downstream delivery failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("publish failed: {0}")]
pub struct PublishError(pub String);

/// Delivers transition events onward.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one event.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] when the event was not handed off.
    async fn publish(&self, event: &TransitionEvent) -> Result<(), PublishError>;
}

/// Publisher that keeps events in memory.
///
/// Handy for embedding the engine in-process and for tests: it can be
/// told to fail the next `n` calls to exercise the re-drive path.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    events: Mutex<Vec<TransitionEvent>>,
    failures_left: AtomicU32,
}

impl MemoryPublisher {
    /// Empty publisher that never fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` publish calls fail.
    pub fn fail_next(&self, count: u32) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Everything published so far, in publication order.
    pub async fn events(&self) -> Vec<TransitionEvent> {
        self.events.lock().await.clone()
    }

    /// Events for one entity, in publication order.
    pub async fn events_for(&self, entity_id: &EntityId) -> Vec<TransitionEvent> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|event| &event.entity_id == entity_id)
            .cloned()
            .collect()
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish(&self, event: &TransitionEvent) -> Result<(), PublishError> {
        if self.take_failure() {
            return Err(PublishError(String::from("injected failure")));
        }
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use locus_types::{Region, TransitionKind};

    use super::*;

    fn event() -> TransitionEvent {
        TransitionEvent::new(
            EntityId::from("truck-01"),
            Region::new(1, "Zone1"),
            TransitionKind::Enter,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let publisher = MemoryPublisher::new();
        publisher.fail_next(2);
        assert!(publisher.publish(&event()).await.is_err());
        assert!(publisher.publish(&event()).await.is_err());
        assert!(publisher.publish(&event()).await.is_ok());
        assert_eq!(publisher.events().await.len(), 1);
    }

    #[tokio::test]
    async fn events_for_filters_by_entity() {
        let publisher = MemoryPublisher::new();
        let mut other = event();
        other.entity_id = EntityId::from("truck-02");
        assert!(publisher.publish(&event()).await.is_ok());
        assert!(publisher.publish(&other).await.is_ok());
        assert_eq!(publisher.events_for(&EntityId::from("truck-02")).await.len(), 1);
    }
}
