//! Text-frame codec for protocol envelopes.
//!
//! Decoding only checks structure. A well-formed message that makes no
//! sense in the current connection state still decodes; rejecting it is
//! the connection's job.

use serde_json::Value;

use super::messages::{Envelope, MessageType, OperationId};

/// Structural decoding failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The frame is not a JSON object.
    #[error("malformed JSON: {0}")]
    MalformedJson(String),
    /// The envelope has no `type` field.
    #[error("message is missing the `type` field")]
    MissingType,
    /// The `type` field is not a known message type.
    #[error("invalid message type: {0}")]
    InvalidType(String),
    /// The `id` field is neither a string nor an integer.
    #[error("invalid operation id: {0}")]
    InvalidId(String),
}

/// Serializes an envelope into one text frame.
///
/// # Errors
///
/// Returns the serializer error if the payload cannot be written as JSON.
pub fn encode(envelope: &Envelope) -> Result<String, serde_json::Error> {
    serde_json::to_string(envelope)
}

/// Parses one text frame into an envelope.
///
/// # Errors
///
/// Returns a [`DecodeError`] when the frame is not a JSON object, lacks a
/// `type`, names an unknown type, or carries an unusable `id`.
pub fn decode(frame: &str) -> Result<Envelope, DecodeError> {
    let value: Value =
        serde_json::from_str(frame).map_err(|e| DecodeError::MalformedJson(e.to_string()))?;
    let Value::Object(mut fields) = value else {
        return Err(DecodeError::MalformedJson(
            "envelope must be a JSON object".to_string(),
        ));
    };

    let msg_type = match fields.remove("type") {
        None | Some(Value::Null) => return Err(DecodeError::MissingType),
        Some(Value::String(name)) => {
            MessageType::from_wire(&name).ok_or(DecodeError::InvalidType(name))?
        }
        Some(other) => return Err(DecodeError::InvalidType(other.to_string())),
    };

    let id = match fields.remove("id") {
        None | Some(Value::Null) => None,
        Some(Value::String(id)) => Some(OperationId::Str(id)),
        Some(Value::Number(n)) => Some(
            n.as_i64()
                .map(OperationId::Int)
                .ok_or_else(|| DecodeError::InvalidId(n.to_string()))?,
        ),
        Some(other) => return Err(DecodeError::InvalidId(other.to_string())),
    };

    let payload = match fields.remove("payload") {
        None | Some(Value::Null) => None,
        Some(payload) => Some(payload),
    };

    Ok(Envelope::new(id, msg_type, payload))
}
