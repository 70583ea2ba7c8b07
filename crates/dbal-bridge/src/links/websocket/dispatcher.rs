use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dbal_core::protocol::RequestFrame;
use dbal_core::Method;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time;

use super::connection::ConnectionManager;
use super::state::{BridgeState, PendingEntry};
use crate::{BridgeError, BridgeResult};

/// Allocates correlation ids.
///
/// Ids are `<prefix>_<n>` with a monotonic `n` starting at 1. The default prefix carries the
/// creation timestamp, so ids stay distinct across bridges created at different times.
#[derive(Debug)]
pub struct IdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl Default for IdGenerator {
    fn default() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|m| m.as_millis())
            .unwrap_or_default();

        Self::with_prefix(format!("req_{seed}"))
    }
}

impl IdGenerator {
    /// Creates a generator seeded with the current time.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a generator with a fixed prefix.
    pub fn with_prefix<S>(prefix: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }

    /// Returns the next id.
    pub fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;

        format!("{}_{n}", self.prefix)
    }

    /// Restarts the sequence at 1.
    pub fn reset(&self) {
        self.counter.store(0, Ordering::Relaxed);
    }
}

/// Removes the pending entry of a call when the call goes away, whatever the reason.
struct PendingGuard<'a> {
    state: &'a BridgeState,
    id: &'a str,
    ticket: u64,
}

impl PendingGuard<'_> {
    fn take(&self) -> Option<PendingEntry> {
        self.state.take_registered(self.id, self.ticket)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.take();
    }
}

/// Turns one call into exactly one outcome, bounded by a timeout.
#[derive(Debug)]
pub(crate) struct CallDispatcher {
    connection: ConnectionManager,
    ids: IdGenerator,
    timeout: Duration,
}

impl CallDispatcher {
    pub fn new(connection: ConnectionManager, ids: IdGenerator, timeout: Duration) -> Self {
        Self {
            connection,
            ids,
            timeout,
        }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn ids(&self) -> &IdGenerator {
        &self.ids
    }

    fn state(&self) -> &Arc<BridgeState> {
        self.connection.state()
    }

    /// Registers `entry` under the next id that no pending call holds.
    fn register(&self, mut entry: PendingEntry) -> (String, u64) {
        loop {
            let id = self.ids.next_id();

            match self.state().register(id.clone(), entry) {
                Ok(ticket) => return (id, ticket),
                Err(m) => {
                    tracing::debug!(%id, "skipping id held by a pending call");
                    entry = m;
                }
            }
        }
    }

    pub async fn call(&self, method: Method, params: Vec<Value>) -> BridgeResult<Value> {
        let (entry, mut rx) = PendingEntry::new();

        // registered before sending, a fast response must find its entry.
        let (id, ticket) = self.register(entry);
        let guard = PendingGuard {
            state: self.state(),
            id: &id,
            ticket,
        };

        let frame = RequestFrame::new(id.as_str(), method, params);
        tracing::trace!(%id, %method, "sending request");

        if let Err(e) = self.connection.send(&frame).await {
            return match guard.take() {
                Some(_) => Err(e),
                None => settled(rx).await,
            };
        }

        match time::timeout(self.timeout, &mut rx).await {
            Ok(Ok(m)) => m,
            Ok(Err(_)) => Err(BridgeError::connection("pending call was dropped")),
            Err(_) => match guard.take() {
                Some(_) => {
                    tracing::debug!(%id, %method, timeout = ?self.timeout, "call timed out");
                    Err(BridgeError::Timeout(self.timeout))
                }
                None => settled(rx).await,
            },
        }
    }
}

/// Waits for the outcome of a call whose entry was already removed by the router or a
/// connection failure. The remover settles the entry right after removing it.
async fn settled(rx: oneshot::Receiver<BridgeResult<Value>>) -> BridgeResult<Value> {
    rx.await
        .unwrap_or_else(|_| Err(BridgeError::connection("pending call was dropped")))
}
