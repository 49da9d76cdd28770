//! Events published on the [`super::EventBus`].
//!
//! Events are produced by the HTTP publish endpoint and consumed by the
//! `events` subscription of the demo schema.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// A payload published under a topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// Topic the event was published to.
    pub topic: String,
    /// Arbitrary JSON payload.
    pub payload: Value,
    /// Publication timestamp.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// JSON object exposed to subscription resolvers.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "topic": self.topic,
            "payload": self.payload,
            "timestamp": self.timestamp.to_rfc3339(),
        })
    }
}
