//! Bridge state shared by the connection manager, the router and the dispatcher.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::AbortHandle;

use super::{FrameSink, TransportError};
use crate::{BridgeError, BridgeResult};

/// The continuation of one in-flight call.
#[derive(Debug)]
pub(crate) struct PendingEntry {
    tx: oneshot::Sender<BridgeResult<Value>>,
    ticket: u64,
}

impl PendingEntry {
    pub fn new() -> (Self, oneshot::Receiver<BridgeResult<Value>>) {
        let (tx, rx) = oneshot::channel();

        (Self { tx, ticket: 0 }, rx)
    }

    pub fn fulfill(self, value: Value) {
        // the caller may have gone away, there is nobody left to tell.
        let _ = self.tx.send(Ok(value));
    }

    pub fn fail(self, error: BridgeError) {
        let _ = self.tx.send(Err(error));
    }
}

/// Correlation id → continuation.
pub(crate) type PendingTable = HashMap<String, PendingEntry>;

/// An in-flight connection attempt, awaited by every caller that needs the connection.
pub(crate) type ConnectAttempt = Shared<BoxFuture<'static, Result<(), TransportError>>>;

pub(crate) struct OpenConnection {
    pub sink: Arc<AsyncMutex<FrameSink>>,
    pub reader: AbortHandle,
}

impl Drop for OpenConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

pub(crate) enum Connection {
    Closed,
    Connecting(ConnectAttempt),
    Open(OpenConnection),
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("Closed"),
            Self::Connecting(_) => f.write_str("Connecting"),
            Self::Open(_) => f.write_str("Open"),
        }
    }
}

/// The mutable part of the bridge state.
///
/// Every transition of `connection` bumps `epoch`, so a stale attempt or reader can tell that
/// the connection it belongs to is gone.
#[derive(Debug)]
pub(crate) struct Slot {
    pub connection: Connection,
    pub epoch: u64,
    pub pending: PendingTable,
    /// Counts registrations, an entry's ticket tells it apart from a later one under the same id.
    pub tickets: u64,
}

/// The bridge state: where to connect, with which credentials, and what is in flight.
pub(crate) struct BridgeState {
    endpoint: String,
    token: Option<String>,
    slot: Mutex<Slot>,
}

impl fmt::Debug for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeState")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl BridgeState {
    pub fn new(endpoint: String, token: Option<String>) -> Self {
        Self {
            endpoint,
            token,
            slot: Mutex::new(Slot {
                connection: Connection::Closed,
                epoch: 0,
                pending: PendingTable::new(),
                tickets: 0,
            }),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Locks the mutable state. The guard must never be held across an await point.
    pub fn lock(&self) -> parking_lot::MutexGuard<'_, Slot> {
        self.slot.lock()
    }

    /// Registers `entry` under `id` and returns its ticket.
    ///
    /// An id held by another pending call is never reused, the entry is handed back instead.
    pub fn register(&self, id: String, mut entry: PendingEntry) -> Result<u64, PendingEntry> {
        let mut slot = self.lock();
        let slot = &mut *slot;

        match slot.pending.entry(id) {
            Entry::Occupied(_) => Err(entry),
            Entry::Vacant(m) => {
                slot.tickets += 1;
                entry.ticket = slot.tickets;
                m.insert(entry);

                Ok(slot.tickets)
            }
        }
    }

    /// Removes the entry for `id`, if it has not been settled yet.
    pub fn take(&self, id: &str) -> Option<PendingEntry> {
        self.lock().pending.remove(id)
    }

    /// Removes the entry for `id` only if it is still the registration holding `ticket`.
    pub fn take_registered(&self, id: &str, ticket: u64) -> Option<PendingEntry> {
        let mut slot = self.lock();

        let owned = slot.pending.get(id).is_some_and(|m| m.ticket == ticket);
        if !owned {
            return None;
        }

        slot.pending.remove(id)
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }
}

/// Fails every entry with an error produced by `error`.
pub(crate) fn fail_all<F>(pending: PendingTable, mut error: F)
where
    F: FnMut() -> BridgeError,
{
    for (_, entry) in pending {
        entry.fail(error());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> BridgeState {
        BridgeState::new("ws://test".into(), None)
    }

    #[test]
    fn register_refuses_taken_ids() {
        let state = state();

        let (first, _first_rx) = PendingEntry::new();
        let (second, _second_rx) = PendingEntry::new();

        assert!(state.register("req_1".into(), first).is_ok());
        assert!(state.register("req_1".into(), second).is_err());
        assert_eq!(state.pending_len(), 1);
    }

    #[test]
    fn stale_ticket_leaves_newer_entry_alone() {
        let state = state();

        let (first, _first_rx) = PendingEntry::new();
        let stale = state.register("req_1".into(), first).unwrap();
        state.take("req_1").unwrap().fulfill(Value::Null);

        let (second, _second_rx) = PendingEntry::new();
        let current = state.register("req_1".into(), second).unwrap();
        assert_ne!(stale, current);

        assert!(state.take_registered("req_1", stale).is_none());
        assert_eq!(state.pending_len(), 1);

        assert!(state.take_registered("req_1", current).is_some());
        assert_eq!(state.pending_len(), 0);
    }
}
