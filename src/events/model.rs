//! Domain event payloads and the topics they are published to
//!
//! Events are transient: decoded from a request body, re-serialized, handed to
//! the broker and dropped. Field values are not range-checked, and a missing
//! field takes its zero value (timestamps default to the Unix epoch).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Broker topics, one per event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Movie,
    User,
    Payment,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::Movie, Topic::User, Topic::Payment];

    pub fn name(&self) -> &'static str {
        match self {
            Topic::Movie => "movie-events",
            Topic::User => "user-events",
            Topic::Payment => "payment-events",
        }
    }

    pub fn from_name(name: &str) -> Option<Topic> {
        Topic::ALL.into_iter().find(|t| t.name() == name)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An event payload bound to its topic.
pub trait DomainEvent: Serialize + DeserializeOwned + Send {
    const TOPIC: Topic;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovieEvent {
    pub movie_id: i64,
    pub title: String,
    /// Free-form, e.g. "view" or "rate".
    pub action: String,
    pub user_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserEvent {
    pub user_id: i64,
    pub username: String,
    pub action: String,
    /// Set by the caller, not by this service.
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentEvent {
    pub payment_id: i64,
    pub user_id: i64,
    pub amount: f64,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// Decode a request body into an event.
///
/// Only a JSON object is accepted; serde's derived visitor would otherwise
/// turn `[]` into an all-default event.
pub fn decode_event<E: DomainEvent>(body: &[u8]) -> Result<E, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_slice(body)?;
    if !value.is_object() {
        return Err(serde::de::Error::custom("expected a JSON object"));
    }
    serde_json::from_value(value)
}

impl DomainEvent for MovieEvent {
    const TOPIC: Topic = Topic::Movie;
}

impl DomainEvent for UserEvent {
    const TOPIC: Topic = Topic::User;
}

impl DomainEvent for PaymentEvent {
    const TOPIC: Topic = Topic::Payment;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_names() {
        assert_eq!(Topic::Movie.name(), "movie-events");
        assert_eq!(Topic::User.name(), "user-events");
        assert_eq!(Topic::Payment.name(), "payment-events");
        assert_eq!(Topic::from_name("payment-events"), Some(Topic::Payment));
        assert_eq!(Topic::from_name("orders"), None);
    }

    #[test]
    fn test_missing_fields_take_zero_values() {
        let event: MovieEvent = serde_json::from_str(r#"{"title":"X"}"#).unwrap();
        assert_eq!(
            event,
            MovieEvent {
                title: "X".to_string(),
                ..Default::default()
            }
        );

        let event: UserEvent = serde_json::from_str("{}").unwrap();
        assert_eq!(event.user_id, 0);
        assert_eq!(event.timestamp.timestamp(), 0);
    }

    #[test]
    fn test_wrong_types_are_rejected() {
        let wrong_type: Result<MovieEvent, _> = serde_json::from_str(
            r#"{"movie_id":"1","title":"X","action":"view","user_id":7}"#,
        );
        assert!(wrong_type.is_err());

        assert!(decode_event::<MovieEvent>(b"[]").is_err());
        assert!(decode_event::<MovieEvent>(b"42").is_err());
        assert!(decode_event::<MovieEvent>(br#"{"title":"X"}"#).is_ok());
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let event: MovieEvent = serde_json::from_str(
            r#"{"movie_id":1,"title":"X","action":"view","user_id":7,"extra":true}"#,
        )
        .unwrap();
        assert_eq!(event.user_id, 7);
    }

    #[test]
    fn test_payment_event_is_permissive_about_values() {
        let event: PaymentEvent = serde_json::from_str(
            r#"{"payment_id":3,"user_id":7,"amount":-12.5,"status":"","timestamp":"2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(event.amount, -12.5);
        assert_eq!(event.timestamp.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }
}
