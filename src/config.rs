//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::GatewayError;

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:4000`).
    pub listen_addr: SocketAddr,

    /// Route serving the subscription WebSocket.
    pub ws_path: String,

    /// Per-connection protocol settings.
    pub connection: ConnectionConfig,

    /// Capacity of the EventBus broadcast channel.
    pub event_bus_capacity: usize,
}

/// Settings applied to every subscription connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Whether `start` is refused until `connection_init` was accepted.
    /// When `false`, the first `start` acknowledges the connection.
    pub require_connection_init: bool,

    /// How long a connection may stay un-initialised. Zero disables it.
    pub connection_init_timeout: Duration,

    /// Interval between `ka` frames. Zero disables keep-alive.
    pub keep_alive_interval: Duration,

    /// Maximum number of concurrently active operations.
    pub max_operations: usize,

    /// Capacity of the outbound frame queue.
    pub outbound_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            require_connection_init: true,
            connection_init_timeout: Duration::from_secs(10),
            keep_alive_interval: Duration::ZERO,
            max_operations: 100,
            outbound_capacity: 256,
        }
    }
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if `LISTEN_ADDR` is set but cannot
    /// be parsed as a [`SocketAddr`], or if `WS_PATH` does not start with `/`.
    pub fn from_env() -> Result<Self, GatewayError> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:4000".to_string())
            .parse()
            .map_err(|e| GatewayError::Config(format!("LISTEN_ADDR: {e}")))?;

        let ws_path = std::env::var("WS_PATH").unwrap_or_else(|_| "/subscriptions".to_string());
        if !ws_path.starts_with('/') {
            return Err(GatewayError::Config(format!(
                "WS_PATH must start with `/`, got `{ws_path}`"
            )));
        }

        let defaults = ConnectionConfig::default();
        let connection = ConnectionConfig {
            require_connection_init: parse_env_bool(
                "REQUIRE_CONNECTION_INIT",
                defaults.require_connection_init,
            ),
            connection_init_timeout: Duration::from_secs(parse_env(
                "CONNECTION_INIT_TIMEOUT_SECS",
                defaults.connection_init_timeout.as_secs(),
            )),
            keep_alive_interval: Duration::from_secs(parse_env(
                "KEEP_ALIVE_INTERVAL_SECS",
                defaults.keep_alive_interval.as_secs(),
            )),
            max_operations: parse_env("MAX_OPERATIONS_PER_CONNECTION", defaults.max_operations),
            outbound_capacity: parse_env("OUTBOUND_CHANNEL_CAPACITY", defaults.outbound_capacity)
                .max(1),
        };

        let event_bus_capacity = parse_env("EVENT_BUS_CAPACITY", 1024_usize).max(1);

        Ok(Self {
            listen_addr,
            ws_path,
            connection,
            event_bus_capacity,
        })
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key)
        .ok()
        .map(|v| v.to_ascii_lowercase())
        .as_deref()
    {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}
