//! Correlation table - matches replies to the callers waiting on them.
//!
//! One table per connection. Every entry inserted by `register` is removed by
//! exactly one of `resolve`, `cancel` or `drain_all`, so nothing outlives the
//! connection and no caller is resolved twice.

use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::bridge::protocol::RequestId;

/// What a waiting caller eventually receives.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The remote side replied with a payload.
    Success(Value),
    /// The remote side replied with an error message.
    Remote(String),
    /// The connection ended before a reply arrived.
    Closed(String),
}

impl Outcome {
    pub fn from_reply(result: Result<Value, String>) -> Self {
        match result {
            Ok(payload) => Self::Success(payload),
            Err(message) => Self::Remote(message),
        }
    }
}

/// The table refused a registration because the connection has ended.
#[derive(Debug, Clone, thiserror::Error)]
#[error("connection closed: {reason}")]
pub struct TableClosed {
    pub reason: String,
}

/// Handle returned by `register`; await it for the request's outcome.
#[must_use = "a pending reply must be awaited or cancelled"]
#[derive(Debug)]
pub struct PendingReply {
    id: RequestId,
    rx: oneshot::Receiver<Outcome>,
}

impl PendingReply {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Wait for the outcome. A dropped table counts as a closed connection.
    pub async fn wait(self) -> Outcome {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Outcome::Closed("correlation table dropped".to_string()),
        }
    }
}

#[derive(Default)]
pub struct CorrelationTable {
    pending: DashMap<RequestId, oneshot::Sender<Outcome>>,
    closed: AtomicBool,
    close_reason: StdMutex<Option<String>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh ID and an entry waiting for its reply.
    pub fn register(&self) -> Result<PendingReply, TableClosed> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(self.closed_error());
        }

        let (tx, rx) = oneshot::channel();
        let id = loop {
            let id = RequestId::new();
            match self.pending.entry(id.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(tx);
                    break id;
                }
                Entry::Occupied(_) => {
                    tracing::warn!(%id, "Request id collision, drawing another");
                }
            }
        };

        // A drain may have run between the check above and the insert; it would
        // have missed this entry, so take it back out ourselves.
        if self.closed.load(Ordering::SeqCst) {
            self.pending.remove(&id);
            return Err(self.closed_error());
        }

        tracing::trace!(%id, pending = self.pending.len(), "Registered request");
        Ok(PendingReply { id, rx })
    }

    /// Deliver `outcome` to the caller waiting on `id`.
    ///
    /// Returns false for unknown or already-resolved IDs; the caller decides how
    /// loudly to report that.
    pub fn resolve(&self, id: &RequestId, outcome: Outcome) -> bool {
        match self.pending.remove(id) {
            Some((_, tx)) => {
                if tx.send(outcome).is_err() {
                    tracing::debug!(%id, "Caller stopped waiting before reply");
                }
                true
            }
            None => false,
        }
    }

    /// Remove an entry without resolving it (caller gave up, e.g. deadline elapsed).
    pub fn cancel(&self, id: &RequestId) -> bool {
        self.pending.remove(id).is_some()
    }

    /// Resolve every pending entry with `Closed(reason)` and refuse new ones.
    ///
    /// Returns how many callers were resolved. Only the first drain's reason is kept.
    pub fn drain_all(&self, reason: impl Into<String>) -> usize {
        let reason = reason.into();
        if let Ok(mut slot) = self.close_reason.lock()
            && slot.is_none()
        {
            *slot = Some(reason.clone());
        }
        self.closed.store(true, Ordering::SeqCst);

        let ids: Vec<RequestId> = self.pending.iter().map(|e| e.key().clone()).collect();
        let mut drained = 0;
        for id in ids {
            if self.resolve(&id, Outcome::Closed(reason.clone())) {
                drained += 1;
            }
        }
        if drained > 0 {
            tracing::debug!(drained, %reason, "Drained pending requests");
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn closed_error(&self) -> TableClosed {
        let reason = self
            .close_reason
            .lock()
            .ok()
            .and_then(|r| r.clone())
            .unwrap_or_else(|| "connection closed".to_string());
        TableClosed { reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn resolve_delivers_to_waiting_caller() {
        let table = CorrelationTable::new();
        let pending = table.register().unwrap();
        let id = pending.id().clone();

        assert!(table.resolve(&id, Outcome::Success(json!({"ok": true}))));
        assert_eq!(pending.wait().await, Outcome::Success(json!({"ok": true})));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn second_resolution_is_discarded() {
        let table = CorrelationTable::new();
        let pending = table.register().unwrap();
        let id = pending.id().clone();

        assert!(table.resolve(&id, Outcome::Success(json!(1))));
        assert!(!table.resolve(&id, Outcome::Success(json!(2))));
        assert_eq!(pending.wait().await, Outcome::Success(json!(1)));
    }

    #[test]
    fn unknown_id_is_not_resolved() {
        let table = CorrelationTable::new();
        let _pending = table.register().unwrap();

        assert!(!table.resolve(&RequestId::from("nope"), Outcome::Success(json!(null))));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn registered_ids_are_unique() {
        let table = CorrelationTable::new();
        let a = table.register().unwrap();
        let b = table.register().unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn drain_all_resolves_everything_and_empties_table() {
        let table = CorrelationTable::new();
        let pending: Vec<_> = (0..5).map(|_| table.register().unwrap()).collect();

        assert_eq!(table.drain_all("pipe closed"), 5);
        assert!(table.is_empty());

        for p in pending {
            assert_eq!(p.wait().await, Outcome::Closed("pipe closed".to_string()));
        }
    }

    #[test]
    fn register_after_drain_is_refused() {
        let table = CorrelationTable::new();
        table.drain_all("eof");
        table.drain_all("later");

        let err = table.register().unwrap_err();
        assert_eq!(err.reason, "eof");
        assert!(table.is_empty());
    }

    #[test]
    fn cancel_removes_without_resolving() {
        let table = CorrelationTable::new();
        let pending = table.register().unwrap();
        let id = pending.id().clone();

        assert!(table.cancel(&id));
        assert!(!table.cancel(&id));
        assert!(!table.resolve(&id, Outcome::Success(json!(null))));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn dropped_table_reads_as_closed() {
        let table = CorrelationTable::new();
        let pending = table.register().unwrap();
        drop(table);

        assert!(matches!(pending.wait().await, Outcome::Closed(_)));
    }

    #[test]
    fn resolve_after_caller_gave_up_still_removes_entry() {
        let table = CorrelationTable::new();
        let pending = table.register().unwrap();
        let id = pending.id().clone();
        drop(pending);

        assert!(table.resolve(&id, Outcome::Remote("late".into())));
        assert!(table.is_empty());
    }
}
