//! graphql-ws-gateway server entry point.
//!
//! Starts the Axum HTTP server with the REST endpoints and the
//! subscription WebSocket.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use graphql_ws_gateway::api;
use graphql_ws_gateway::app_state::AppState;
use graphql_ws_gateway::config::GatewayConfig;
use graphql_ws_gateway::demo;
use graphql_ws_gateway::domain::EventBus;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = GatewayConfig::from_env().context("loading configuration")?;
    tracing::info!(addr = %config.listen_addr, "starting graphql-ws-gateway");

    // Build domain layer
    let event_bus = EventBus::new(config.event_bus_capacity);

    // Build executor
    let schema = demo::schema(event_bus.clone()).context("building demo schema")?;

    // Build application state
    let app_state = AppState {
        executor: Arc::new(schema),
        event_bus,
        connection: config.connection.clone(),
    };

    // Build router
    let app = api::build_app(app_state, &config.ws_path);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, ws_path = %config.ws_path, "server listening");

    axum::serve(listener, app).await.context("serving HTTP")?;

    Ok(())
}
