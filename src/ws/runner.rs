//! Operation runner: turns one `start` request into a lazy result sequence.
//!
//! The executor is asked for an [`EventSource`](crate::executor::EventSource)
//! the first time the sequence is polled. Every source value is then
//! executed against the rest of the selection set, and the resulting
//! [`ExecutionResult`] is only yielded once that execution, including every
//! deferred field resolver below it, has completed.

use std::sync::Arc;

use futures_util::future;
use futures_util::stream::{self, AbortHandle, BoxStream, StreamExt};

use crate::executor::{ExecutionResult, Executor, GraphQLError, OperationRequest};

/// Failure that terminates an operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RunnerError {
    /// The executor refused the request (syntax or validation errors).
    #[error("operation rejected: {}", join_messages(.0))]
    Rejected(Vec<GraphQLError>),
    /// The event source failed while producing its next value.
    #[error("event source failed: {0}")]
    Source(GraphQLError),
}

/// Joins error messages with `; `.
pub(crate) fn join_messages(errors: &[GraphQLError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// One element of an operation's result sequence.
pub type RunnerItem = Result<ExecutionResult, RunnerError>;

/// Lazy result sequence of one operation.
pub type OperationStream = BoxStream<'static, RunnerItem>;

/// Stops an operation's result sequence.
///
/// Cancelling is idempotent and safe after the sequence has ended. Once
/// cancelled the sequence yields no further elements and the event source
/// is no longer polled.
#[derive(Debug, Clone)]
pub struct CancelHandle(AbortHandle);

impl CancelHandle {
    /// Cancels the operation.
    pub fn cancel(&self) {
        self.0.abort();
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.is_aborted()
    }

    /// A handle not attached to any sequence.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        let (handle, _registration) = AbortHandle::new_pair();
        Self(handle)
    }
}

/// Starts operations against an [`Executor`].
#[derive(Debug)]
pub struct OperationRunner;

impl OperationRunner {
    /// Builds the result sequence for `request`.
    ///
    /// Nothing runs until the returned stream is first polled. Resolver
    /// errors arrive as results with populated `errors`; a rejected request
    /// or a failing source yields one [`RunnerError`] and ends the sequence.
    #[must_use]
    pub fn start(
        executor: Arc<dyn Executor>,
        request: OperationRequest,
    ) -> (OperationStream, CancelHandle) {
        let request = Arc::new(request);

        let subscribed = {
            let executor = Arc::clone(&executor);
            let request = Arc::clone(&request);
            async move { executor.subscribe(&request).await }
        };

        let results = stream::once(subscribed).flat_map(move |subscribed| match subscribed {
            Ok(source) => {
                let executor = Arc::clone(&executor);
                let request = Arc::clone(&request);
                source
                    .into_stream()
                    .then(move |item| {
                        let executor = Arc::clone(&executor);
                        let request = Arc::clone(&request);
                        async move {
                            match item {
                                Ok(root) => Ok(executor.execute(&request, root).await),
                                Err(error) => Err(RunnerError::Source(error)),
                            }
                        }
                    })
                    .boxed()
            }
            Err(errors) => stream::once(future::ready(Err(RunnerError::Rejected(errors)))).boxed(),
        });

        // A runner error is always the last element.
        let results = results.scan(false, |failed, item: RunnerItem| {
            if *failed {
                return future::ready(None);
            }
            *failed = item.is_err();
            future::ready(Some(item))
        });

        let (results, handle) = stream::abortable(results.boxed());
        (results.boxed(), CancelHandle(handle))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::executor::{EventSource, Producer};
    use futures_util::future::{BoxFuture, FutureExt};
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Executes every root value by waiting a little and wrapping it.
    #[derive(Debug, Default)]
    struct EchoExecutor {
        executions: AtomicUsize,
    }

    impl Executor for EchoExecutor {
        fn subscribe<'a>(
            &'a self,
            request: &'a OperationRequest,
        ) -> BoxFuture<'a, Result<EventSource, Vec<GraphQLError>>> {
            async move {
                match request.query.as_str() {
                    "one" => Ok(Producer::immediate(json!(1))),
                    "many" => Ok(Producer::deferred(stream::iter(
                        (1..=3).map(|n| Ok(json!(n))).collect::<Vec<_>>(),
                    ))),
                    "broken" => Ok(Producer::deferred(stream::iter(vec![
                        Ok(json!(1)),
                        Err(GraphQLError::new("feed dropped")),
                        Ok(json!(2)),
                    ]))),
                    "endless" => Ok(Producer::deferred(
                        stream::unfold(0_i64, |n| async move {
                            tokio::time::sleep(Duration::from_millis(5)).await;
                            Some((Ok(json!(n)), n + 1))
                        }),
                    )),
                    other => Err(vec![GraphQLError::new(format!("unknown query {other}"))]),
                }
            }
            .boxed()
        }

        fn execute<'a>(
            &'a self,
            _request: &'a OperationRequest,
            root: Value,
        ) -> BoxFuture<'a, ExecutionResult> {
            async move {
                tokio::time::sleep(Duration::from_millis(2)).await;
                self.executions.fetch_add(1, Ordering::SeqCst);
                if root == json!(2) {
                    return ExecutionResult::from_errors(vec![GraphQLError::new("odd root")]);
                }
                ExecutionResult::from_data(json!({ "value": root }))
            }
            .boxed()
        }
    }

    fn start(query: &str) -> (OperationStream, CancelHandle, Arc<EchoExecutor>) {
        let executor = Arc::new(EchoExecutor::default());
        let (stream, cancel) = OperationRunner::start(
            Arc::clone(&executor) as Arc<dyn Executor>,
            OperationRequest::new(query),
        );
        (stream, cancel, executor)
    }

    #[tokio::test]
    async fn immediate_source_yields_exactly_one_result() {
        let (stream, _cancel, _) = start("one");
        let items: Vec<RunnerItem> = stream.collect().await;
        assert_eq!(
            items,
            vec![Ok(ExecutionResult::from_data(json!({"value": 1})))]
        );
    }

    #[tokio::test]
    async fn deferred_source_preserves_order_and_keeps_resolver_errors_inline() {
        let (stream, _cancel, _) = start("many");
        let items: Vec<RunnerItem> = stream.collect().await;
        assert_eq!(items.len(), 3);
        let [Ok(first), Ok(second), Ok(third)] = items.as_slice() else {
            panic!("expected three results, got {items:?}");
        };
        assert_eq!(first.data, Some(json!({"value": 1})));
        assert!(second.has_errors());
        assert!(second.data.is_none());
        assert_eq!(third.data, Some(json!({"value": 3})));
    }

    #[tokio::test]
    async fn source_failure_terminates_the_sequence() {
        let (stream, _cancel, executor) = start("broken");
        let items: Vec<RunnerItem> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert!(matches!(items.last(), Some(Err(RunnerError::Source(_)))));
        assert_eq!(executor.executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejected_request_yields_single_error() {
        let (stream, _cancel, executor) = start("nonsense");
        let items: Vec<RunnerItem> = stream.collect().await;
        let [Err(RunnerError::Rejected(errors))] = items.as_slice() else {
            panic!("expected rejection, got {items:?}");
        };
        assert_eq!(errors.len(), 1);
        assert_eq!(executor.executions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn nothing_runs_until_polled() {
        let (_stream, _cancel, executor) = start("one");
        tokio::task::yield_now().await;
        assert_eq!(executor.executions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_stops_an_endless_source() {
        let (mut stream, cancel, _) = start("endless");
        let Some(Ok(first)) = stream.next().await else {
            panic!("expected a first result");
        };
        assert_eq!(first.data, Some(json!({"value": 0})));

        cancel.cancel();
        assert!(cancel.is_cancelled());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn cancel_is_idempotent_after_exhaustion() {
        let (stream, cancel, _) = start("one");
        let items: Vec<RunnerItem> = stream.collect().await;
        assert_eq!(items.len(), 1);
        cancel.cancel();
        cancel.cancel();
        assert!(cancel.is_cancelled());
    }
}
