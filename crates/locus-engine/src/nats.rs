//! NATS pub/sub integration for location intake and event publication.
//!
//! Vehicles publish on `locus.vehicles.{vehicle_id}.location`. The engine
//! subscribes with a wildcard, decodes each payload into a
//! [`PositionUpdate`], and publishes every derived transition as a
//! [`GeofenceEventMessage`] on the events subject.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use locus_core::publisher::{EventPublisher, PublishError};
use locus_types::{GeofenceEventMessage, LocationMessage, PositionUpdate, TransitionEvent};
use tracing::{debug, info};

use crate::error::{EngineError, IntakeError};

/// NATS client wrapper for the engine.
#[derive(Clone)]
pub struct NatsClient {
    client: async_nats::Client,
}

impl NatsClient {
    /// Connect to a NATS server.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Nats`] if the connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self, EngineError> {
        info!(url = url, "connecting to NATS server");
        let client = async_nats::connect(url).await.map_err(|e| EngineError::Nats {
            message: format!("failed to connect to {url}: {e}"),
        })?;
        info!("NATS connection established");
        Ok(Self { client })
    }

    /// Subscribe to vehicle location subjects.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Nats`] if the subscription fails.
    pub async fn subscribe_locations(
        &self,
        subject: &str,
    ) -> Result<async_nats::Subscriber, EngineError> {
        debug!(subject = subject, "subscribing to location subjects");
        let subscriber = self
            .client
            .subscribe(subject.to_owned())
            .await
            .map_err(|e| EngineError::Nats {
                message: format!("failed to subscribe to {subject}: {e}"),
            })?;
        info!(subject = subject, "subscribed to location subjects");
        Ok(subscriber)
    }

    /// Event publisher writing to `subject` on this connection.
    pub fn event_publisher(&self, subject: &str) -> NatsEventPublisher {
        NatsEventPublisher {
            client: self.client.clone(),
            subject: subject.to_owned(),
        }
    }

    /// Flush all pending messages to the NATS server.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Nats`] if the flush operation fails.
    pub async fn flush(&self) -> Result<(), EngineError> {
        self.client.flush().await.map_err(|e| EngineError::Nats {
            message: format!("flush failed: {e}"),
        })
    }
}

impl std::fmt::Debug for NatsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsClient")
            .field("state", &self.client.connection_state())
            .finish()
    }
}

/// Extract the vehicle id from a location subject.
///
/// Subject format: `locus.vehicles.{vehicle_id}.location`
///
/// Returns `None` if the subject does not match the expected format.
pub fn extract_vehicle_from_subject(subject: &str) -> Option<&str> {
    let mut parts = subject.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("locus"), Some("vehicles"), Some(id), Some("location"), None) if !id.is_empty() => {
            Some(id)
        }
        _ => None,
    }
}

/// Decode a location payload received on `subject` at `received_at`.
///
/// # Errors
///
/// Returns [`IntakeError::Decode`] for malformed JSON and
/// [`IntakeError::Invalid`] when the payload names a different vehicle
/// than the subject.
pub fn decode_location(
    subject: &str,
    payload: &[u8],
    received_at: DateTime<Utc>,
) -> Result<PositionUpdate, IntakeError> {
    let message: LocationMessage =
        serde_json::from_slice(payload).map_err(|source| IntakeError::Decode {
            subject: subject.to_owned(),
            source,
        })?;
    Ok(message.into_update(extract_vehicle_from_subject(subject), received_at)?)
}

/// [`EventPublisher`] that serializes each event as a
/// [`GeofenceEventMessage`] and publishes it on one subject.
#[derive(Clone)]
pub struct NatsEventPublisher {
    client: async_nats::Client,
    subject: String,
}

/// Serialize an event into its wire payload.
///
/// # Errors
///
/// Returns [`PublishError`] if serialization fails.
pub fn encode_event(event: &TransitionEvent) -> Result<Vec<u8>, PublishError> {
    serde_json::to_vec(&GeofenceEventMessage::from(event))
        .map_err(|e| PublishError(format!("failed to serialize event: {e}")))
}

#[async_trait]
impl EventPublisher for NatsEventPublisher {
    async fn publish(&self, event: &TransitionEvent) -> Result<(), PublishError> {
        let payload = encode_event(event)?;
        self.client
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(|e| PublishError(format!("failed to publish to {}: {e}", self.subject)))?;
        debug!(
            subject = self.subject,
            entity_id = %event.entity_id,
            kind = %event.kind,
            "published transition event"
        );
        Ok(())
    }
}

impl std::fmt::Debug for NatsEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsEventPublisher")
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}
