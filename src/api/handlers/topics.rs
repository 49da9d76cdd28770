//! Topic publish endpoint.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;

use crate::app_state::AppState;
use crate::domain::Event;
use crate::error::GatewayError;

/// Maximum accepted topic length.
const MAX_TOPIC_LEN: usize = 128;

/// Response of a publish request.
#[derive(Debug, Serialize)]
pub struct PublishResponse {
    /// Topic the payload was published to.
    pub topic: String,
    /// Number of bus receivers the event reached.
    pub receivers: usize,
}

/// `POST /api/v1/topics/{topic}`: Publish a JSON payload to `events` subscribers.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] if the topic is blank or too long.
pub async fn publish_handler(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, GatewayError> {
    let topic = topic.trim();
    if topic.is_empty() {
        return Err(GatewayError::InvalidRequest(
            "topic must not be empty".to_string(),
        ));
    }
    if topic.len() > MAX_TOPIC_LEN {
        return Err(GatewayError::InvalidRequest(format!(
            "topic must be at most {MAX_TOPIC_LEN} bytes"
        )));
    }

    let receivers = state.event_bus.publish(Event::new(topic, payload));
    tracing::debug!(%topic, receivers, "event published");

    Ok(Json(PublishResponse {
        topic: topic.to_string(),
        receivers,
    }))
}

/// Topic routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/topics/{topic}", post(publish_handler))
}
