//! Gateway error types with protocol and HTTP mappings.
//!
//! [`GatewayError`] is the central error type for the gateway. Each variant
//! maps to a numeric code carried in `error` frames and, for the HTTP
//! surface, to a status code and structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Value, json};

use crate::executor::GraphQLError;
use crate::ws::codec::DecodeError;
use crate::ws::messages::OperationId;
use crate::ws::runner::{RunnerError, join_messages};

/// Structured JSON error response body.
///
/// All HTTP error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1001,
///     "message": "invalid request: topic must not be empty",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Gateway error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category          | Reported as                        |
/// |-----------|-------------------|------------------------------------|
/// | 1000–1999 | Protocol/Request  | `error` frame, 400 Bad Request     |
/// | 2000–2999 | Connection state  | `error` frame, 409 Conflict        |
/// | 3000–3999 | Server/Source     | `error` frame, 500 Internal Error  |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A frame could not be decoded.
    #[error("{0}")]
    Decode(#[from] DecodeError),

    /// Well-formed message that is not valid in the current state.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The executor refused the operation.
    #[error("operation rejected: {}", join_messages(.0))]
    Rejected(Vec<GraphQLError>),

    /// A `start` reused the id of an operation that is still running.
    #[error("operation {0} is already in progress")]
    OperationAlreadyActive(OperationId),

    /// The connection already runs the maximum number of operations.
    #[error("too many active operations (limit {limit})")]
    TooManyOperations {
        /// Configured per-connection limit.
        limit: usize,
    },

    /// The executor refused the `connection_init` payload.
    #[error("connection rejected: {0}")]
    ConnectionRejected(String),

    /// No `connection_init` arrived in time.
    #[error("connection initialisation timed out")]
    ConnectionInitTimeout,

    /// An event source failed and its operation was terminated.
    #[error("event source failed: {0}")]
    Source(String),

    /// The transport channel closed or broke.
    #[error("transport error: {0}")]
    Transport(String),

    /// A schema definition is inconsistent.
    #[error("invalid schema: {0}")]
    Schema(String),

    /// Configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::Decode(_) => 1002,
            Self::Protocol(_) => 1003,
            Self::Rejected(_) => 1004,
            Self::OperationAlreadyActive(_) => 2001,
            Self::TooManyOperations { .. } => 2002,
            Self::ConnectionRejected(_) => 2003,
            Self::ConnectionInitTimeout => 2004,
            Self::Internal(_) => 3000,
            Self::Source(_) => 3001,
            Self::Transport(_) => 3002,
            Self::Schema(_) => 3003,
            Self::Config(_) => 3004,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::Decode(_) | Self::Protocol(_) | Self::Rejected(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::OperationAlreadyActive(_) | Self::TooManyOperations { .. } => {
                StatusCode::CONFLICT
            }
            Self::ConnectionRejected(_) => StatusCode::FORBIDDEN,
            Self::ConnectionInitTimeout => StatusCode::REQUEST_TIMEOUT,
            Self::Source(_) | Self::Transport(_) => StatusCode::BAD_GATEWAY,
            Self::Schema(_) | Self::Config(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Payload of the `error` frame reporting this error.
    ///
    /// Always `{"message", "code"}`; rejected operations also carry the
    /// GraphQL `errors` list.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        let mut payload = json!({
            "message": self.to_string(),
            "code": self.error_code(),
        });
        if let Self::Rejected(errors) = self
            && let Some(fields) = payload.as_object_mut()
        {
            fields.insert(
                "errors".to_string(),
                serde_json::to_value(errors).unwrap_or_default(),
            );
        }
        payload
    }
}

impl From<RunnerError> for GatewayError {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::Rejected(errors) => Self::Rejected(errors),
            RunnerError::Source(error) => Self::Source(error.message),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_message_and_code() {
        let err = GatewayError::OperationAlreadyActive(OperationId::Int(1));
        assert_eq!(
            err.to_payload(),
            json!({"message": "operation 1 is already in progress", "code": 2001})
        );
    }

    #[test]
    fn rejected_payload_lists_graphql_errors() {
        let err = GatewayError::Rejected(vec![GraphQLError::new("Syntax Error: unexpected `}`")]);
        let payload = err.to_payload();
        assert_eq!(payload["code"], json!(1004));
        assert_eq!(
            payload["errors"],
            json!([{"message": "Syntax Error: unexpected `}`"}])
        );
    }

    #[test]
    fn runner_errors_convert() {
        let source: GatewayError = RunnerError::Source(GraphQLError::new("feed closed")).into();
        assert!(matches!(source, GatewayError::Source(ref m) if m == "feed closed"));
        assert_eq!(source.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn decode_errors_are_bad_requests() {
        let err = GatewayError::from(DecodeError::MissingType);
        assert_eq!(err.error_code(), 1002);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "message is missing the `type` field");
    }
}
