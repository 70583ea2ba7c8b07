//! Settles pending calls from inbound frames.

use std::sync::Arc;

use dbal_core::protocol::{ResponseFrame, ResponseOutcome};

use super::state::BridgeState;
use crate::BridgeError;

/// Matches inbound response frames to pending calls.
///
/// Malformed, late and foreign frames are logged and dropped, they never affect unrelated calls.
#[derive(Debug, Clone)]
pub(crate) struct MessageRouter {
    state: Arc<BridgeState>,
}

impl MessageRouter {
    pub fn new(state: Arc<BridgeState>) -> Self {
        Self { state }
    }

    /// Routes one raw inbound frame.
    pub fn route(&self, raw: &str) {
        let frame = match ResponseFrame::parse(raw) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(reason = %e, len = raw.len(), "dropping malformed frame");
                return;
            }
        };

        let Some(entry) = self.state.take(&frame.id) else {
            tracing::debug!(id = %frame.id, "dropping response without pending call");
            return;
        };

        match frame.outcome {
            ResponseOutcome::Result(m) => entry.fulfill(m),
            ResponseOutcome::Error(e) => entry.fail(BridgeError::Remote(e)),
        }
    }
}
