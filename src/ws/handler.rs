//! Axum WebSocket upgrade handler.
//!
//! Bridges an axum [`WebSocket`] to a [`Connection`]: a writer task encodes
//! outbound envelopes into text frames while the connection consumes the
//! inbound text frames.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt, future};
use tokio::sync::mpsc;

use super::codec;
use super::connection::Connection;
use super::messages::Envelope;
use crate::app_state::AppState;
use crate::error::GatewayError;

/// WebSocket subprotocol spoken on the subscription endpoint.
pub const PROTOCOL: &str = "graphql-ws";

/// `GET {WS_PATH}`: Upgrade HTTP connection to a graphql-ws session.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.protocols([PROTOCOL])
        .on_upgrade(move |socket| serve_socket(socket, state))
}

/// Runs one graphql-ws session over an upgraded socket.
pub async fn serve_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, ws_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) =
        mpsc::channel::<Envelope>(state.connection.outbound_capacity);

    let writer = tokio::spawn(async move {
        while let Some(envelope) = outbound_rx.recv().await {
            let text = match codec::encode(&envelope) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode outbound frame");
                    continue;
                }
            };
            if let Err(e) = ws_tx.send(Message::text(text)).await {
                let err = GatewayError::Transport(e.to_string());
                tracing::debug!(error = %err, "websocket send failed");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let inbound = ws_rx
        .take_while(|msg| {
            future::ready(match msg {
                Ok(Message::Close(_)) => false,
                Ok(_) => true,
                Err(e) => {
                    let err = GatewayError::Transport(e.to_string());
                    tracing::debug!(error = %err, "websocket receive failed");
                    false
                }
            })
        })
        .filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(text.as_str().to_owned()),
                _ => None,
            })
        })
        .boxed();

    let connection = Connection::new(
        Arc::clone(&state.executor),
        outbound_tx,
        state.connection.clone(),
    );
    connection.run(inbound).await;

    if let Err(e) = writer.await {
        tracing::debug!(error = %e, "websocket writer task ended abnormally");
    }
}
