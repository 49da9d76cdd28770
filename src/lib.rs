//! # graphql-ws-gateway
//!
//! GraphQL subscriptions over the `graphql-ws` WebSocket protocol.
//!
//! One WebSocket connection multiplexes any number of independent
//! operations. Each operation's event source is either a single value
//! (immediate) or a lazily produced sequence (deferred), and every value is
//! executed against the rest of the selection set, including deferred
//! field resolvers, before it is sent as a `data` frame.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket, HTTP)
//!     │
//!     ├── WS Handler (ws::handler)        REST Handlers (api/)
//!     │       │                                 │
//!     ├── Connection state machine              │
//!     │   (ws::connection, ws::registry)        │
//!     │       │                                 │
//!     ├── Operation runner (ws::runner)         │
//!     │       │                                 │
//!     ├── Executor (executor/, schema/)         │
//!     │       │                                 │
//!     └── EventBus (domain/) ◄──────────────────┘
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod demo;
pub mod domain;
pub mod error;
pub mod executor;
pub mod schema;
pub mod ws;
