//! Wire message types for the `graphql-ws` protocol.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::executor::ExecutionResult;

/// Caller-assigned operation identifier.
///
/// Clients may use strings or integers; the server echoes the id back
/// in the same JSON type it was received in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperationId {
    /// Integer id, e.g. `1`.
    Int(i64),
    /// String id, e.g. `"1"`.
    Str(String),
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{id}"),
            Self::Str(id) => f.write_str(id),
        }
    }
}

impl From<i64> for OperationId {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

impl From<&str> for OperationId {
    fn from(id: &str) -> Self {
        Self::Str(id.to_string())
    }
}

impl From<String> for OperationId {
    fn from(id: String) -> Self {
        Self::Str(id)
    }
}

/// Discriminator for protocol messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Client → Server: open the protocol session.
    ConnectionInit,
    /// Client → Server: start an operation.
    Start,
    /// Client → Server: stop an operation.
    Stop,
    /// Client → Server: close the session.
    ConnectionTerminate,
    /// Server → Client: session accepted.
    ConnectionAck,
    /// Server → Client: keep-alive.
    #[serde(rename = "ka")]
    KeepAlive,
    /// Server → Client: one execution result.
    Data,
    /// Server → Client: operation or connection error.
    Error,
    /// Server → Client: operation finished.
    Complete,
}

impl MessageType {
    /// Wire name of the message type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionInit => "connection_init",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::ConnectionTerminate => "connection_terminate",
            Self::ConnectionAck => "connection_ack",
            Self::KeepAlive => "ka",
            Self::Data => "data",
            Self::Error => "error",
            Self::Complete => "complete",
        }
    }

    /// Looks up a message type by its wire name.
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        [
            Self::ConnectionInit,
            Self::Start,
            Self::Stop,
            Self::ConnectionTerminate,
            Self::ConnectionAck,
            Self::KeepAlive,
            Self::Data,
            Self::Error,
            Self::Complete,
        ]
        .into_iter()
        .find(|ty| ty.as_str() == name)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One protocol message. Each physical frame carries exactly one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<OperationId>,
    #[serde(rename = "type")]
    msg_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
}

impl Envelope {
    /// Builds an envelope from its parts.
    #[must_use]
    pub fn new(id: Option<OperationId>, msg_type: MessageType, payload: Option<Value>) -> Self {
        Self {
            id,
            msg_type,
            payload,
        }
    }

    /// `connection_ack`.
    #[must_use]
    pub fn connection_ack() -> Self {
        Self::new(None, MessageType::ConnectionAck, None)
    }

    /// `ka`.
    #[must_use]
    pub fn keep_alive() -> Self {
        Self::new(None, MessageType::KeepAlive, None)
    }

    /// `data` carrying one execution result.
    #[must_use]
    pub fn data(id: OperationId, result: &ExecutionResult) -> Self {
        Self::new(Some(id), MessageType::Data, Some(result.to_value()))
    }

    /// `error`, scoped to an operation when `id` is set.
    #[must_use]
    pub fn error(id: Option<OperationId>, payload: Value) -> Self {
        Self::new(id, MessageType::Error, Some(payload))
    }

    /// `complete`.
    #[must_use]
    pub fn complete(id: OperationId) -> Self {
        Self::new(Some(id), MessageType::Complete, None)
    }

    /// Operation id, if the message is scoped to one.
    #[must_use]
    pub fn id(&self) -> Option<&OperationId> {
        self.id.as_ref()
    }

    /// Message type.
    #[must_use]
    pub fn msg_type(&self) -> MessageType {
        self.msg_type
    }

    /// Message payload.
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Splits the envelope into `(id, type, payload)`.
    #[must_use]
    pub fn into_parts(self) -> (Option<OperationId>, MessageType, Option<Value>) {
        (self.id, self.msg_type, self.payload)
    }
}

/// Payload of a `start` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartPayload {
    /// GraphQL document source.
    pub query: String,
    /// Variable values, `null` or absent when unused.
    #[serde(default)]
    pub variables: Option<Map<String, Value>>,
    /// Operation to run when the document holds several.
    #[serde(default, rename = "operationName")]
    pub operation_name: Option<String>,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_names_round_trip_through_lookup() {
        for name in ["connection_init", "start", "stop", "ka", "complete"] {
            let Some(ty) = MessageType::from_wire(name) else {
                panic!("unknown message type {name}");
            };
            assert_eq!(ty.as_str(), name);
        }
        assert!(MessageType::from_wire("subscribe").is_none());
    }

    #[test]
    fn operation_id_keeps_its_json_type() {
        assert_eq!(serde_json::to_value(OperationId::Int(1)).ok(), Some(json!(1)));
        assert_eq!(
            serde_json::to_value(OperationId::from("a")).ok(),
            Some(json!("a"))
        );
        assert_eq!(OperationId::Int(7).to_string(), "7");
    }

    #[test]
    fn start_payload_accepts_null_variables() {
        let raw = json!({"query": "subscription { syncData { field } }", "variables": null});
        let Ok(payload) = serde_json::from_value::<StartPayload>(raw) else {
            panic!("payload should parse");
        };
        assert!(payload.variables.is_none());
        assert!(payload.operation_name.is_none());
    }
}
