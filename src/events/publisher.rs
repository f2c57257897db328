//! Producer seam between the HTTP handlers and the broker

use std::fmt;

use async_trait::async_trait;

use super::model::{DomainEvent, Topic};

#[derive(Debug, Clone)]
pub enum PublishError {
    Serialization(String),
    Broker(String),
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishError::Serialization(msg) => write!(f, "Failed to serialize event: {}", msg),
            PublishError::Broker(msg) => write!(f, "Failed to write message to broker: {}", msg),
        }
    }
}

impl std::error::Error for PublishError {}

/// Durable, acknowledged writes to a topic.
///
/// One instance is built at startup and shared by every request handler, so
/// implementations must be safe for concurrent use.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Write one message with no key. Returns once the broker acknowledged it.
    async fn publish(&self, topic: Topic, payload: Vec<u8>) -> Result<(), PublishError>;

    /// Whether the broker connection is currently usable.
    fn is_connected(&self) -> bool {
        true
    }
}

/// Serialize an event and publish it to its topic. Returns the bytes written.
pub async fn publish_event<E: DomainEvent + Sync>(
    publisher: &dyn EventPublisher,
    event: &E,
) -> Result<Vec<u8>, PublishError> {
    let payload =
        serde_json::to_vec(event).map_err(|e| PublishError::Serialization(e.to_string()))?;
    publisher.publish(E::TOPIC, payload.clone()).await?;
    Ok(payload)
}
