//! Executor capability: the boundary between the transport and GraphQL.
//!
//! The subscription transport never interprets a query itself. It hands
//! every `start` request to an [`Executor`], which first turns the request
//! into an [`EventSource`] and then executes the operation's selection set
//! once per source value.

pub mod producer;
pub mod result;

use std::fmt;

use futures_util::future::BoxFuture;
use serde_json::{Map, Value};

pub use producer::{Producer, Resolution};
pub use result::{ExecutionResult, GraphQLError, PathSegment};

use crate::ws::messages::StartPayload;

/// Source of root values for one operation.
///
/// `Err` items are source failures and terminate the operation.
pub type EventSource = Producer<Value, GraphQLError>;

/// Failure reported by a single field resolver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct FieldError {
    /// Human-readable error message.
    pub message: String,
}

impl FieldError {
    /// Creates a resolver error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A GraphQL operation as requested by a `start` message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationRequest {
    /// GraphQL document source.
    pub query: String,
    /// Variable values supplied by the client.
    pub variables: Map<String, Value>,
    /// Name of the operation to run when the document holds several.
    pub operation_name: Option<String>,
}

impl OperationRequest {
    /// Creates a request without variables.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }
}

impl From<StartPayload> for OperationRequest {
    fn from(payload: StartPayload) -> Self {
        Self {
            query: payload.query,
            variables: payload.variables.unwrap_or_default(),
            operation_name: payload.operation_name,
        }
    }
}

/// Executes GraphQL operations on behalf of the subscription transport.
///
/// One executor is shared by every connection; it must not keep
/// per-connection state.
pub trait Executor: Send + Sync + fmt::Debug {
    /// Validates the `connection_init` payload.
    ///
    /// # Errors
    ///
    /// Returns a message describing why the connection is refused.
    fn connect(&self, _payload: Option<&Value>) -> Result<(), String> {
        Ok(())
    }

    /// Parses and validates the request and resolves its root field into
    /// an [`EventSource`].
    ///
    /// # Errors
    ///
    /// Returns the GraphQL errors that prevent the operation from running.
    fn subscribe<'a>(
        &'a self,
        request: &'a OperationRequest,
    ) -> BoxFuture<'a, Result<EventSource, Vec<GraphQLError>>>;

    /// Executes the rest of the selection set against one source value.
    ///
    /// The returned future completes only after every resolver reachable
    /// from `root` has completed.
    fn execute<'a>(
        &'a self,
        request: &'a OperationRequest,
        root: Value,
    ) -> BoxFuture<'a, ExecutionResult>;
}
