//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::config::ConnectionConfig;
use crate::domain::EventBus;
use crate::executor::Executor;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Executor handed to every subscription connection.
    pub executor: Arc<dyn Executor>,
    /// Event bus fed by the publish endpoint.
    pub event_bus: EventBus,
    /// Settings applied to every subscription connection.
    pub connection: ConnectionConfig,
}
