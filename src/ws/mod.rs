//! WebSocket layer: the graphql-ws subscription transport.
//!
//! Frames are decoded by [`codec`] into [`messages::Envelope`]s and applied
//! to a per-session [`connection::Connection`]. Each `start` becomes an
//! operation produced by [`runner::OperationRunner`] and tracked in a
//! [`registry::OperationTable`] until it completes, fails or is stopped.

pub mod codec;
pub mod connection;
pub mod handler;
pub mod messages;
pub mod registry;
pub mod runner;
