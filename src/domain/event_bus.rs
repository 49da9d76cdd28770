//! Broadcast channel for published events.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. Every publish
//! request sends an [`Event`] through the bus, and every active `events`
//! subscription holds a receiver filtered to its topic.

use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast;

use super::Event;

/// Broadcast bus for [`Event`]s.
///
/// Backed by a `tokio::broadcast` channel with a configurable capacity
/// (default 1024). When the ring buffer is full, the oldest events are
/// dropped for lagging receivers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event.
    /// If there are no active receivers, the event is silently dropped.
    pub fn publish(&self, event: Event) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Creates a new receiver that will receive all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Stream of future events published under `topic`.
    ///
    /// The receiver is registered immediately, so events published after
    /// this call are not missed even if the stream is polled later. Lagged
    /// events are skipped; the stream ends when the bus is dropped.
    #[must_use]
    pub fn topic_stream(&self, topic: impl Into<String>) -> BoxStream<'static, Event> {
        let topic = topic.into();
        let rx = self.subscribe();
        stream::unfold(rx, move |mut rx| {
            let topic = topic.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(event) if event.topic == topic => return Some((event, rx)),
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(lagged = n, %topic, "subscription lagged behind event bus");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        })
        .boxed()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
