//! Lazy value producers for the two resolution styles.
//!
//! A resolver either hands back its value directly (immediate style) or
//! hands back something that produces it later (deferred style). Code
//! downstream of a resolver only ever calls [`Producer::into_stream`] or
//! [`Resolution::resolve`], so it never branches on the style.

use std::fmt;
use std::future::Future;

use futures_util::future::{self, BoxFuture, FutureExt};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use serde_json::Value;

use super::FieldError;

/// Source of successive values for a subscription root field.
pub enum Producer<T, E> {
    /// A single value, available now. Behaves as a one-element sequence.
    Immediate(T),
    /// A sequence whose elements arrive over time. Ends when the stream
    /// ends; an `Err` item is a failure of the source itself.
    Deferred(BoxStream<'static, Result<T, E>>),
}

impl<T, E> Producer<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Wraps a value that is already available.
    #[must_use]
    pub fn immediate(value: T) -> Self {
        Self::Immediate(value)
    }

    /// Wraps a stream of values produced over time.
    #[must_use]
    pub fn deferred<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
    {
        Self::Deferred(stream.boxed())
    }

    /// Converts either style into one uniform lazy sequence.
    #[must_use]
    pub fn into_stream(self) -> BoxStream<'static, Result<T, E>> {
        match self {
            Self::Immediate(value) => stream::once(future::ready(Ok(value))).boxed(),
            Self::Deferred(stream) => stream,
        }
    }

    /// Maps source failures into another error type.
    #[must_use]
    pub fn map_err<E2, F>(self, mut f: F) -> Producer<T, E2>
    where
        E2: Send + 'static,
        F: FnMut(E) -> E2 + Send + 'static,
    {
        match self {
            Self::Immediate(value) => Producer::Immediate(value),
            Self::Deferred(stream) => {
                Producer::Deferred(stream.map(move |item| item.map_err(&mut f)).boxed())
            }
        }
    }
}

impl<T: fmt::Debug, E> fmt::Debug for Producer<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate(value) => f.debug_tuple("Immediate").field(value).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Outcome of a single field resolver.
pub enum Resolution {
    /// The resolver computed its value synchronously.
    Immediate(Result<Value, FieldError>),
    /// The value is computed by a future that must be awaited.
    Deferred(BoxFuture<'static, Result<Value, FieldError>>),
}

impl Resolution {
    /// An immediately available value.
    #[must_use]
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Immediate(Ok(value.into()))
    }

    /// An immediate resolver failure.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Immediate(Err(FieldError::new(message)))
    }

    /// A value computed asynchronously.
    #[must_use]
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, FieldError>> + Send + 'static,
    {
        Self::Deferred(future.boxed())
    }

    /// Waits until the value is available, whichever style produced it.
    ///
    /// # Errors
    ///
    /// Returns the resolver's [`FieldError`] if it failed.
    pub async fn resolve(self) -> Result<Value, FieldError> {
        match self {
            Self::Immediate(result) => result,
            Self::Deferred(future) => future.await,
        }
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate(result) => f.debug_tuple("Immediate").field(result).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}
