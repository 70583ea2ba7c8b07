//! Connection lifecycle.
//!
//! ```text
//! Closed --connect--> Connecting --success--> Open
//! Connecting --failure--> Closed
//! Open --error / close--> Closed
//! ```
//!
//! At most one connection attempt is in flight. Callers arriving while an attempt is connecting
//! await that same attempt. Losing the connection, or failing to open it, fails every pending
//! call with a connection error.

use std::fmt;
use std::mem;
use std::sync::{Arc, Weak};

use dbal_core::protocol::RequestFrame;
use futures::{FutureExt, SinkExt, StreamExt};
use tokio::sync::Mutex as AsyncMutex;

use super::router::MessageRouter;
use super::state::{fail_all, BridgeState, Connection, OpenConnection};
use super::{Connector, FrameStream, TransportError};
use crate::{BridgeError, BridgeResult};

/// Owns the connection of one bridge.
pub(crate) struct ConnectionManager {
    state: Arc<BridgeState>,
    connector: Arc<dyn Connector>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state)
            .field("connector", &self.connector)
            .finish()
    }
}

impl ConnectionManager {
    pub fn new(state: Arc<BridgeState>, connector: Arc<dyn Connector>) -> Self {
        Self { state, connector }
    }

    pub fn state(&self) -> &Arc<BridgeState> {
        &self.state
    }

    /// Makes sure the connection is open, connecting if needed.
    pub async fn ensure_connection(&self) -> BridgeResult<()> {
        let attempt = {
            let mut guard = self.state.lock();
            let slot = &mut *guard;

            match slot.connection {
                Connection::Open(_) => return Ok(()),
                Connection::Connecting(ref m) => m.clone(),
                Connection::Closed => {
                    slot.epoch += 1;
                    let attempt = establish(
                        Arc::downgrade(&self.state),
                        self.connector.clone(),
                        slot.epoch,
                    )
                    .boxed()
                    .shared();
                    slot.connection = Connection::Connecting(attempt.clone());

                    attempt
                }
            }
        };

        attempt
            .await
            .map_err(|e| BridgeError::connection(e.to_string()))
    }

    /// Sends a request, connecting first if needed.
    pub async fn send(&self, frame: &RequestFrame) -> BridgeResult<()> {
        self.ensure_connection().await?;

        let (epoch, sink) = {
            let slot = self.state.lock();
            match slot.connection {
                Connection::Open(ref m) => (slot.epoch, m.sink.clone()),
                _ => return Err(BridgeError::connection("connection is not open")),
            }
        };

        let text = frame.to_text()?;
        let outcome = sink.lock().await.send(text).await;

        if let Err(e) = outcome {
            let error = BridgeError::connection(e.to_string());
            connection_lost(&self.state, epoch, e);

            return Err(error);
        }

        Ok(())
    }

    /// Fails every pending call with [`BridgeError::Closed`] and closes the connection.
    pub async fn close(&self) {
        let (previous, pending) = {
            let mut slot = self.state.lock();
            slot.epoch += 1;

            (
                mem::replace(&mut slot.connection, Connection::Closed),
                mem::take(&mut slot.pending),
            )
        };

        tracing::debug!(
            endpoint = %self.state.endpoint(),
            failed = pending.len(),
            state = ?previous,
            "closing bridge"
        );
        fail_all(pending, || BridgeError::Closed);

        if let Connection::Open(m) = previous {
            if let Err(e) = m.sink.lock().await.close().await {
                tracing::debug!(reason = %e, "failed to close connection cleanly");
            }
        }
    }
}

fn bridge_dropped() -> TransportError {
    TransportError::new("bridge dropped while connecting")
}

/// Runs one connection attempt. This future is shared by every caller awaiting the attempt,
/// so the transition it performs happens exactly once.
///
/// The attempt lives inside the state it updates, so it only holds a weak reference to it.
async fn establish(
    state: Weak<BridgeState>,
    connector: Arc<dyn Connector>,
    epoch: u64,
) -> Result<(), TransportError> {
    let (endpoint, token) = match state.upgrade() {
        Some(m) => (m.endpoint().to_owned(), m.token().map(str::to_owned)),
        None => return Err(bridge_dropped()),
    };

    tracing::debug!(%endpoint, epoch, "connecting to daemon");
    let outcome = connector.connect(&endpoint, token.as_deref()).await;

    let state = state.upgrade().ok_or_else(bridge_dropped)?;
    let mut slot = state.lock();
    let current = slot.epoch == epoch && matches!(slot.connection, Connection::Connecting(_));

    match outcome {
        Ok((sink, stream)) if current => {
            let reader = tokio::spawn(read(Arc::downgrade(&state), epoch, stream));
            slot.connection = Connection::Open(OpenConnection {
                sink: Arc::new(AsyncMutex::new(sink)),
                reader: reader.abort_handle(),
            });

            tracing::debug!(%endpoint, epoch, "connected to daemon");
            Ok(())
        }
        // the bridge was closed while this attempt was connecting.
        Ok(_) => Err(TransportError::new("bridge closed while connecting")),
        Err(e) => {
            if current {
                slot.connection = Connection::Closed;
                slot.epoch += 1;
                let pending = mem::take(&mut slot.pending);
                drop(slot);

                tracing::warn!(
                    %endpoint,
                    reason = %e,
                    failed = pending.len(),
                    "failed to connect to daemon"
                );
                fail_all(pending, || BridgeError::connection(e.to_string()));
            }

            Err(e)
        }
    }
}

/// Feeds inbound frames to the router until the connection ends.
///
/// Stops quietly once every handle of the bridge is gone.
async fn read(state: Weak<BridgeState>, epoch: u64, mut stream: FrameStream) {
    while let Some(frame) = stream.next().await {
        let Some(state) = state.upgrade() else {
            return;
        };

        match frame {
            Ok(m) => MessageRouter::new(state).route(&m),
            Err(e) => {
                connection_lost(&state, epoch, e);
                return;
            }
        }
    }

    if let Some(state) = state.upgrade() {
        connection_lost(&state, epoch, TransportError::new("connection closed by daemon"));
    }
}

/// Tears down the connection of `epoch`, if it is still the current one.
fn connection_lost(state: &BridgeState, epoch: u64, reason: TransportError) {
    let mut slot = state.lock();

    if slot.epoch != epoch || !matches!(slot.connection, Connection::Open(_)) {
        return;
    }

    let previous = mem::replace(&mut slot.connection, Connection::Closed);
    slot.epoch += 1;
    let pending = mem::take(&mut slot.pending);
    drop(slot);

    // dropping the connection stops its reader.
    drop(previous);

    tracing::warn!(
        endpoint = %state.endpoint(),
        reason = %reason,
        failed = pending.len(),
        "lost connection to daemon"
    );
    fail_all(pending, || BridgeError::connection(reason.to_string()));
}
