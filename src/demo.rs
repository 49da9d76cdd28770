//! Demo schema served by the gateway binary.
//!
//! | root field | source | fields |
//! |---|---|---|
//! | `syncData` | immediate | `field` resolved immediately |
//! | `asyncData` | deferred, one element | `field` resolved by a future |
//! | `countdown(from: Int = 3)` | deferred, `from..=1` | `value` |
//! | `events(topic: String!)` | deferred, [`EventBus`] | `topic`, `payload`, `timestamp` |
//!
//! The query root has `hello(name: String)`.

use std::time::Duration;

use futures_util::future;
use futures_util::stream::{self, StreamExt};
use serde_json::{Value, json};

use crate::domain::EventBus;
use crate::error::GatewayError;
use crate::executor::{FieldError, Producer, Resolution};
use crate::schema::{FieldDef, ObjectType, Schema, SubscriptionField, TypeRef};

/// Delay between two countdown values.
pub const COUNTDOWN_STEP: Duration = Duration::from_millis(100);

const COUNTDOWN_DEFAULT: i64 = 3;

/// Builds the demo schema; `events` subscriptions read from `event_bus`.
///
/// # Errors
///
/// Returns [`GatewayError::Schema`] if the type definitions are inconsistent.
pub fn schema(event_bus: EventBus) -> Result<Schema, GatewayError> {
    Schema::builder()
        .query(ObjectType::new("Query").field(
            "hello",
            FieldDef::scalar().resolve_with(|ctx| {
                let name = ctx.arg("name").and_then(Value::as_str).unwrap_or("world");
                Resolution::value(format!("Hello, {name}!"))
            }),
        ))
        .object(
            ObjectType::new("SyncData")
                .field("field", FieldDef::scalar().resolve_with(|_| Resolution::value(true))),
        )
        .object(ObjectType::new("AsyncData").field(
            "field",
            FieldDef::scalar().resolve_with(|_| {
                Resolution::deferred(async {
                    tokio::task::yield_now().await;
                    Ok(json!(true))
                })
            }),
        ))
        .object(ObjectType::new("Countdown").field("value", FieldDef::scalar()))
        .object(
            ObjectType::new("Event")
                .field("topic", FieldDef::scalar())
                .field("payload", FieldDef::scalar())
                .field("timestamp", FieldDef::scalar()),
        )
        .subscription(
            "syncData",
            SubscriptionField::new(TypeRef::object("SyncData"), |_| {
                Producer::immediate(json!({}))
            }),
        )
        .subscription(
            "asyncData",
            SubscriptionField::new(TypeRef::object("AsyncData"), |_| {
                Producer::deferred(stream::once(async {
                    tokio::task::yield_now().await;
                    Ok(json!({}))
                }))
            }),
        )
        .subscription(
            "countdown",
            SubscriptionField::new(TypeRef::object("Countdown"), |ctx| {
                let from = ctx
                    .arg("from")
                    .and_then(Value::as_i64)
                    .unwrap_or(COUNTDOWN_DEFAULT);
                Producer::deferred(countdown(from))
            }),
        )
        .subscription(
            "events",
            SubscriptionField::new(TypeRef::object("Event"), move |ctx| {
                let Some(topic) = ctx.arg("topic").and_then(Value::as_str) else {
                    return Producer::deferred(stream::once(future::ready(Err(FieldError::new(
                        "argument \"topic\" of type \"String!\" is required",
                    )))));
                };
                Producer::deferred(event_bus.topic_stream(topic).map(|event| Ok(event.to_value())))
            }),
        )
        .build()
}

fn countdown(from: i64) -> impl futures_util::Stream<Item = Result<Value, FieldError>> {
    stream::unfold(from, |n| async move {
        if n < 1 {
            return None;
        }
        tokio::time::sleep(COUNTDOWN_STEP).await;
        Some((Ok(json!({ "value": n })), n - 1))
    })
}
