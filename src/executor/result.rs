//! GraphQL execution results and structured errors.
//!
//! [`ExecutionResult`] is the payload of every `data` frame. It is produced
//! once per element of an operation's source sequence.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One segment of a response path: an object key or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Response key of an object field.
    Key(String),
    /// Position inside a list.
    Index(usize),
}

/// Structured GraphQL error as it appears in a response `errors` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct GraphQLError {
    /// Human-readable error message.
    pub message: String,
    /// Response path of the field that failed, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,
}

impl GraphQLError {
    /// Creates an error without a path.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
        }
    }

    /// Attaches the response path of the failing field.
    #[must_use]
    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = Some(path);
        self
    }
}

/// Result of executing one element of an operation.
///
/// Serializes as `{"data": ..., "errors": [...]}`; `errors` is omitted when
/// empty so a clean result reads `{"data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Resolved data, `null` when execution failed.
    pub data: Option<Value>,
    /// Errors raised while resolving fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphQLError>>,
}

impl ExecutionResult {
    /// A successful result carrying `data`.
    #[must_use]
    pub fn from_data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: None,
        }
    }

    /// A failed result: `data` is `null` and `errors` is populated.
    #[must_use]
    pub fn from_errors(errors: Vec<GraphQLError>) -> Self {
        Self {
            data: None,
            errors: Some(errors),
        }
    }

    /// Returns `true` if any resolver reported an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|errors| !errors.is_empty())
    }

    /// Converts the result into the JSON value carried by a `data` frame.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clean_result_omits_errors() {
        let result = ExecutionResult::from_data(json!({"syncData": {"field": true}}));
        assert_eq!(
            result.to_value(),
            json!({"data": {"syncData": {"field": true}}})
        );
        assert!(!result.has_errors());
    }

    #[test]
    fn failed_result_has_null_data() {
        let error = GraphQLError::new("boom").with_path(vec![
            PathSegment::Key("items".to_string()),
            PathSegment::Index(2),
        ]);
        let result = ExecutionResult::from_errors(vec![error]);
        assert!(result.has_errors());
        assert_eq!(
            result.to_value(),
            json!({"data": null, "errors": [{"message": "boom", "path": ["items", 2]}]})
        );
    }
}
