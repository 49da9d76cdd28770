//! Connection state machine and dispatch loop.
//!
//! A [`Connection`] owns one transport session. Inbound frames are handled
//! one at a time by [`Connection::run`]; every started operation gets its
//! own pump task that forwards results through the shared
//! [`OperationTable`], so a slow event source never holds up control
//! messages or other operations.
//!
//! ```text
//!            connection_init (accepted)
//!   Pending ───────────────────────────► Acknowledged
//!      │                                      │
//!      │ init rejected / init timeout /       │ connection_terminate /
//!      │ undecodable frame / transport close  │ transport close
//!      ▼                                      ▼
//!    Closed ◄──────────── Terminating ◄───────┘
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::Instrument;
use uuid::Uuid;

use super::codec;
use super::messages::{Envelope, MessageType, OperationId, StartPayload};
use super::registry::OperationTable;
use super::runner::{OperationRunner, OperationStream};
use crate::config::ConnectionConfig;
use crate::error::GatewayError;
use crate::executor::{Executor, OperationRequest};

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for `connection_init`.
    Pending,
    /// `connection_init` accepted; operations may run.
    Acknowledged,
    /// Cancelling operations on the way to [`Closed`](Self::Closed).
    Terminating,
    /// Terminal; no further frames are processed.
    Closed,
}

impl ConnectionState {
    /// Lowercase name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Acknowledged => "acknowledged",
            Self::Terminating => "terminating",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One graphql-ws session.
#[derive(Debug)]
pub struct Connection {
    id: Uuid,
    state: ConnectionState,
    executor: Arc<dyn Executor>,
    operations: OperationTable,
    outbound: mpsc::Sender<Envelope>,
    config: ConnectionConfig,
}

impl Connection {
    /// Creates a pending connection writing frames to `outbound`.
    #[must_use]
    pub fn new(
        executor: Arc<dyn Executor>,
        outbound: mpsc::Sender<Envelope>,
        config: ConnectionConfig,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: ConnectionState::Pending,
            executor,
            operations: OperationTable::new(outbound.clone()),
            outbound,
            config,
        }
    }

    /// Connection identifier used in logs.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns `true` once the connection reached [`ConnectionState::Closed`].
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// Active operations of this connection.
    #[must_use]
    pub const fn operations(&self) -> &OperationTable {
        &self.operations
    }

    /// Drives the connection until it closes.
    ///
    /// `inbound` yields the text frames received from the transport; its
    /// end is treated as a transport close. The init timeout and
    /// keep-alive timer from the [`ConnectionConfig`] are handled here.
    pub async fn run<S>(mut self, mut inbound: S)
    where
        S: Stream<Item = String> + Unpin,
    {
        tracing::info!(connection_id = %self.id, "connection opened");

        let init_timeout = self.config.connection_init_timeout;
        let enforce_init_timeout = self.config.require_connection_init && !init_timeout.is_zero();
        let init_deadline = tokio::time::sleep(init_timeout);
        tokio::pin!(init_deadline);

        let mut keep_alive = keep_alive_timer(self.config.keep_alive_interval);

        while !self.is_closed() {
            tokio::select! {
                frame = inbound.next() => match frame {
                    Some(frame) => self.handle_frame(&frame).await,
                    None => {
                        tracing::debug!(connection_id = %self.id, "transport closed");
                        self.close().await;
                    }
                },
                () = &mut init_deadline, if enforce_init_timeout && self.state == ConnectionState::Pending => {
                    tracing::warn!(connection_id = %self.id, timeout = ?init_timeout, "connection_init not received in time");
                    self.send_error(None, &GatewayError::ConnectionInitTimeout).await;
                    self.close().await;
                }
                () = next_tick(&mut keep_alive), if self.state == ConnectionState::Acknowledged => {
                    self.send(Envelope::keep_alive()).await;
                }
            }
        }

        tracing::info!(connection_id = %self.id, "connection closed");
    }

    /// Decodes and handles one inbound text frame.
    ///
    /// Undecodable frames are answered with an `error` frame; while the
    /// connection is still pending they also close it.
    pub async fn handle_frame(&mut self, frame: &str) {
        match codec::decode(frame) {
            Ok(envelope) => self.handle_envelope(envelope).await,
            Err(err) => {
                tracing::warn!(connection_id = %self.id, state = %self.state, error = %err, "undecodable frame");
                if self.is_closed() {
                    return;
                }
                self.send_error(None, &GatewayError::from(err)).await;
                if self.state == ConnectionState::Pending {
                    self.close().await;
                }
            }
        }
    }

    /// Applies one decoded client message to the state machine.
    pub async fn handle_envelope(&mut self, envelope: Envelope) {
        if self.is_closed() {
            return;
        }
        let (id, msg_type, payload) = envelope.into_parts();
        tracing::debug!(
            connection_id = %self.id,
            state = %self.state,
            operation_id = ?id,
            msg_type = %msg_type,
            "inbound message"
        );

        match msg_type {
            MessageType::ConnectionInit => self.on_init(payload).await,
            MessageType::Start => self.on_start(id, payload).await,
            MessageType::Stop => self.on_stop(id).await,
            MessageType::ConnectionTerminate => self.close().await,
            other => {
                tracing::warn!(connection_id = %self.id, msg_type = %other, "server-only message from client");
                let err = GatewayError::Protocol(format!("unexpected message type `{other}`"));
                self.send_error(id, &err).await;
            }
        }
    }

    /// Cancels every active operation and moves to `closed`.
    ///
    /// No frames are emitted for the cancelled operations. Calling this on a
    /// closed connection does nothing.
    pub async fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.state = ConnectionState::Terminating;
        let cancelled = self.operations.cancel_all().await;
        self.state = ConnectionState::Closed;
        tracing::debug!(connection_id = %self.id, cancelled, "operations cancelled");
    }

    async fn on_init(&mut self, payload: Option<Value>) {
        match self.state {
            ConnectionState::Pending => match self.executor.connect(payload.as_ref()) {
                Ok(()) => {
                    self.state = ConnectionState::Acknowledged;
                    tracing::info!(connection_id = %self.id, "connection acknowledged");
                    self.send(Envelope::connection_ack()).await;
                    if !self.config.keep_alive_interval.is_zero() {
                        self.send(Envelope::keep_alive()).await;
                    }
                }
                Err(reason) => {
                    tracing::warn!(connection_id = %self.id, %reason, "connection_init rejected");
                    self.send_error(None, &GatewayError::ConnectionRejected(reason))
                        .await;
                    self.close().await;
                }
            },
            ConnectionState::Acknowledged => {
                let err = GatewayError::Protocol("connection already initialised".to_string());
                self.send_error(None, &err).await;
            }
            ConnectionState::Terminating | ConnectionState::Closed => {}
        }
    }

    async fn on_start(&mut self, id: Option<OperationId>, payload: Option<Value>) {
        let Some(id) = id else {
            let err = GatewayError::Protocol("`start` requires an id".to_string());
            self.send_error(None, &err).await;
            return;
        };

        match self.state {
            ConnectionState::Acknowledged => {}
            ConnectionState::Pending if !self.config.require_connection_init => {
                self.state = ConnectionState::Acknowledged;
                tracing::debug!(connection_id = %self.id, "connection acknowledged by first start");
            }
            ConnectionState::Pending | ConnectionState::Terminating => {
                let err = GatewayError::Protocol(format!(
                    "`start` is not allowed while the connection is {}",
                    self.state
                ));
                self.send_error(Some(id), &err).await;
                return;
            }
            ConnectionState::Closed => return,
        }

        let request = match payload.map(serde_json::from_value::<StartPayload>) {
            Some(Ok(start)) => OperationRequest::from(start),
            Some(Err(e)) => {
                let err = GatewayError::InvalidRequest(format!("invalid start payload: {e}"));
                self.send_error(Some(id), &err).await;
                return;
            }
            None => {
                let err = GatewayError::InvalidRequest("start payload is missing".to_string());
                self.send_error(Some(id), &err).await;
                return;
            }
        };

        let (results, cancel) = OperationRunner::start(Arc::clone(&self.executor), request);
        match self
            .operations
            .register(id.clone(), cancel, self.config.max_operations)
            .await
        {
            Ok(seq) => {
                tracing::debug!(connection_id = %self.id, operation_id = %id, "operation started");
                let span = tracing::debug_span!(
                    "operation",
                    connection_id = %self.id,
                    operation_id = %id
                );
                tokio::spawn(
                    pump_operation(self.operations.clone(), id, seq, results).instrument(span),
                );
            }
            Err(err) => {
                tracing::warn!(connection_id = %self.id, operation_id = %id, error = %err, "start refused");
                self.send_error(Some(id), &err).await;
            }
        }
    }

    async fn on_stop(&mut self, id: Option<OperationId>) {
        let Some(id) = id else {
            let err = GatewayError::Protocol("`stop` requires an id".to_string());
            self.send_error(None, &err).await;
            return;
        };

        match self.state {
            ConnectionState::Acknowledged => {
                let stopped = self.operations.stop(&id).await;
                tracing::debug!(connection_id = %self.id, operation_id = %id, stopped, "stop");
            }
            // Nothing can be running yet.
            ConnectionState::Pending if !self.config.require_connection_init => {}
            ConnectionState::Pending | ConnectionState::Terminating => {
                let err = GatewayError::Protocol(format!(
                    "`stop` is not allowed while the connection is {}",
                    self.state
                ));
                self.send_error(Some(id), &err).await;
            }
            ConnectionState::Closed => {}
        }
    }

    async fn send_error(&self, id: Option<OperationId>, err: &GatewayError) {
        self.send(Envelope::error(id, err.to_payload())).await;
    }

    async fn send(&self, envelope: Envelope) {
        if self.outbound.send(envelope).await.is_err() {
            tracing::debug!(connection_id = %self.id, "outbound queue closed, frame dropped");
        }
    }
}

/// Forwards one operation's results until it ends or is cancelled.
async fn pump_operation(
    operations: OperationTable,
    id: OperationId,
    seq: u64,
    mut results: OperationStream,
) {
    while let Some(item) = results.next().await {
        match item {
            Ok(result) => {
                if !operations
                    .deliver(&id, seq, Envelope::data(id.clone(), &result))
                    .await
                {
                    tracing::debug!("operation no longer registered");
                    return;
                }
            }
            Err(err) => {
                let err = GatewayError::from(err);
                tracing::debug!(error = %err, "operation failed");
                operations
                    .finish(&id, seq, Envelope::error(Some(id.clone()), err.to_payload()))
                    .await;
                return;
            }
        }
    }
    if operations.finish(&id, seq, Envelope::complete(id.clone())).await {
        tracing::debug!("operation completed");
    }
}

fn keep_alive_timer(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(interval)
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
