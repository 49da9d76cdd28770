//! Per-connection operation table.
//!
//! Tracks which operation ids are active on a connection and serializes
//! every change to that set behind one lock. A slot in the outbound queue
//! is reserved before the lock is taken and the frame is handed over while
//! holding it, so once an operation is stopped or cancelled no later `data`
//! frame can slip out for it, and a full queue never blocks other ids.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use super::messages::{Envelope, OperationId};
use super::runner::CancelHandle;
use crate::error::GatewayError;

#[derive(Debug)]
struct ActiveOperation {
    /// Distinguishes successive operations that reuse the same id.
    seq: u64,
    cancel: CancelHandle,
}

#[derive(Debug, Default)]
struct Operations {
    active: HashMap<OperationId, ActiveOperation>,
    next_seq: u64,
}

/// Registration table shared by a connection and its operation pumps.
#[derive(Debug, Clone)]
pub struct OperationTable {
    inner: Arc<Mutex<Operations>>,
    outbound: mpsc::Sender<Envelope>,
}

impl OperationTable {
    /// Creates an empty table writing frames to `outbound`.
    #[must_use]
    pub fn new(outbound: mpsc::Sender<Envelope>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Operations::default())),
            outbound,
        }
    }

    /// Registers a new operation and returns its sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::OperationAlreadyActive`] if `id` is already
    /// registered, or [`GatewayError::TooManyOperations`] when `limit`
    /// operations are already active. The existing operations are left
    /// untouched in both cases.
    pub async fn register(
        &self,
        id: OperationId,
        cancel: CancelHandle,
        limit: usize,
    ) -> Result<u64, GatewayError> {
        let mut ops = self.inner.lock().await;
        if ops.active.contains_key(&id) {
            return Err(GatewayError::OperationAlreadyActive(id));
        }
        if ops.active.len() >= limit {
            return Err(GatewayError::TooManyOperations { limit });
        }
        let seq = ops.next_seq;
        ops.next_seq += 1;
        ops.active.insert(id, ActiveOperation { seq, cancel });
        Ok(seq)
    }

    /// Waits for room in the outbound queue without holding the lock.
    async fn reserve(&self, id: &OperationId) -> Option<mpsc::Permit<'_, Envelope>> {
        match self.outbound.reserve().await {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::debug!(operation_id = %id, "outbound queue closed, frame dropped");
                None
            }
        }
    }

    /// Queues `envelope` if operation `(id, seq)` is still registered.
    ///
    /// Returns `false` when the operation is gone or the outbound queue
    /// has been closed; the caller should stop pumping.
    pub async fn deliver(&self, id: &OperationId, seq: u64, envelope: Envelope) -> bool {
        let Some(permit) = self.reserve(id).await else {
            return false;
        };
        let ops = self.inner.lock().await;
        if !ops.active.get(id).is_some_and(|op| op.seq == seq) {
            return false;
        }
        permit.send(envelope);
        true
    }

    /// Deregisters operation `(id, seq)` after its sequence ended and
    /// queues its final frame.
    ///
    /// Does nothing if the operation was already stopped. Returns `true`
    /// if the final frame was queued.
    pub async fn finish(&self, id: &OperationId, seq: u64, envelope: Envelope) -> bool {
        let permit = self.reserve(id).await;
        let mut ops = self.inner.lock().await;
        if !ops.active.get(id).is_some_and(|op| op.seq == seq) {
            return false;
        }
        ops.active.remove(id);
        let Some(permit) = permit else {
            return false;
        };
        permit.send(envelope);
        true
    }

    /// Cancels operation `id`, queues `complete{id}` and deregisters it.
    ///
    /// Returns `false` if no such operation is active. The operation is
    /// still cancelled when the outbound queue has been closed.
    pub async fn stop(&self, id: &OperationId) -> bool {
        let permit = self.reserve(id).await;
        let mut ops = self.inner.lock().await;
        let Some(op) = ops.active.remove(id) else {
            return false;
        };
        op.cancel.cancel();
        if let Some(permit) = permit {
            permit.send(Envelope::complete(id.clone()));
        }
        true
    }

    /// Cancels every active operation without emitting frames.
    ///
    /// Returns the number of operations cancelled.
    pub async fn cancel_all(&self) -> usize {
        let mut ops = self.inner.lock().await;
        let count = ops.active.len();
        for (_, op) in ops.active.drain() {
            op.cancel.cancel();
        }
        count
    }

    /// Returns `true` if `id` is currently active.
    pub async fn contains(&self, id: &OperationId) -> bool {
        self.inner.lock().await.active.contains_key(id)
    }

    /// Returns the number of active operations.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.active.len()
    }

    /// Returns `true` if no operation is active.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.active.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::executor::ExecutionResult;
    use crate::ws::messages::MessageType;
    use serde_json::json;
    use std::time::Duration;

    fn cancel_handle() -> CancelHandle {
        CancelHandle::detached()
    }

    fn table() -> (OperationTable, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(16);
        (OperationTable::new(tx), rx)
    }

    fn data(id: i64) -> Envelope {
        Envelope::data(
            OperationId::Int(id),
            &ExecutionResult::from_data(json!({"n": id})),
        )
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let (table, _rx) = table();
        let id = OperationId::Int(1);
        assert!(table.register(id.clone(), cancel_handle(), 10).await.is_ok());
        let Err(err) = table.register(id.clone(), cancel_handle(), 10).await else {
            panic!("duplicate registration must fail");
        };
        assert!(matches!(err, GatewayError::OperationAlreadyActive(_)));
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test]
    async fn limit_is_enforced() {
        let (table, _rx) = table();
        assert!(table.register(OperationId::Int(1), cancel_handle(), 1).await.is_ok());
        let Err(err) = table.register(OperationId::Int(2), cancel_handle(), 1).await else {
            panic!("second registration must fail");
        };
        assert!(matches!(err, GatewayError::TooManyOperations { limit: 1 }));
    }

    #[tokio::test]
    async fn stop_cancels_and_completes() {
        let (table, mut rx) = table();
        let cancel = cancel_handle();
        let id = OperationId::from("a");
        let Ok(seq) = table.register(id.clone(), cancel.clone(), 10).await else {
            panic!("register failed");
        };

        assert!(table.stop(&id).await);
        assert!(cancel.is_cancelled());
        let Some(frame) = rx.recv().await else {
            panic!("expected complete frame");
        };
        assert_eq!(frame.msg_type(), MessageType::Complete);

        // The pump can no longer deliver or finish.
        assert!(!table.deliver(&id, seq, data(1)).await);
        assert!(!table.finish(&id, seq, Envelope::complete(id.clone())).await);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stop_of_unknown_id_is_a_noop() {
        let (table, mut rx) = table();
        assert!(!table.stop(&OperationId::Int(9)).await);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stale_sequence_cannot_deliver_to_reused_id() {
        let (table, mut rx) = table();
        let id = OperationId::Int(1);
        let Ok(old) = table.register(id.clone(), cancel_handle(), 10).await else {
            panic!("register failed");
        };
        assert!(table.stop(&id).await);
        let _complete = rx.recv().await;

        let Ok(new) = table.register(id.clone(), cancel_handle(), 10).await else {
            panic!("re-register failed");
        };
        assert_ne!(old, new);
        assert!(!table.deliver(&id, old, data(1)).await);
        assert!(table.deliver(&id, new, data(2)).await);
        let Some(frame) = rx.recv().await else {
            panic!("expected data frame");
        };
        assert_eq!(frame, data(2));
    }

    #[tokio::test]
    async fn finish_deregisters() {
        let (table, mut rx) = table();
        let id = OperationId::Int(4);
        let Ok(seq) = table.register(id.clone(), cancel_handle(), 10).await else {
            panic!("register failed");
        };
        assert!(table.finish(&id, seq, Envelope::complete(id.clone())).await);
        assert!(!table.contains(&id).await);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn cancel_all_is_silent() {
        let (table, mut rx) = table();
        let handles: Vec<CancelHandle> = (0..3).map(|_| cancel_handle()).collect();
        for (n, cancel) in handles.iter().enumerate() {
            let id = OperationId::Int(i64::try_from(n).unwrap_or_default());
            assert!(table.register(id, cancel.clone(), 10).await.is_ok());
        }
        assert_eq!(table.cancel_all().await, 3);
        assert!(table.is_empty().await);
        assert!(handles.iter().all(CancelHandle::is_cancelled));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_does_not_block_other_ids() {
        let (tx, mut rx) = mpsc::channel(1);
        let table = OperationTable::new(tx);
        let busy = OperationId::Int(1);
        let Ok(seq) = table.register(busy.clone(), cancel_handle(), 10).await else {
            panic!("register failed");
        };
        assert!(table.deliver(&busy, seq, data(1)).await);

        let parked = {
            let table = table.clone();
            let busy = busy.clone();
            tokio::spawn(async move { table.deliver(&busy, seq, data(2)).await })
        };
        tokio::task::yield_now().await;

        let other = tokio::time::timeout(
            Duration::from_millis(200),
            table.register(OperationId::Int(2), cancel_handle(), 10),
        )
        .await;
        assert!(matches!(other, Ok(Ok(_))));
        assert_eq!(table.len().await, 2);

        assert_eq!(rx.recv().await, Some(data(1)));
        assert!(matches!(parked.await, Ok(true)));
        assert_eq!(rx.recv().await, Some(data(2)));
    }

    #[tokio::test]
    async fn closed_queue_still_deregisters() {
        let (table, rx) = table();
        drop(rx);
        let stopped = OperationId::Int(1);
        let finished = OperationId::Int(2);
        let cancel = cancel_handle();
        assert!(table.register(stopped.clone(), cancel.clone(), 10).await.is_ok());
        let Ok(seq) = table.register(finished.clone(), cancel_handle(), 10).await else {
            panic!("register failed");
        };

        assert!(table.stop(&stopped).await);
        assert!(cancel.is_cancelled());
        assert!(!table.deliver(&finished, seq, data(2)).await);
        assert!(!table.finish(&finished, seq, Envelope::complete(finished.clone())).await);
        assert!(table.is_empty().await);
    }
}
