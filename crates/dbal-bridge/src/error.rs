use std::time::Duration;

use dbal_core::StorageError;
use serde_json::Value;
use thiserror::Error;

/// The kind of a [`BridgeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The connection failed to open, or closed while the call was outstanding.
    Connection,
    /// A frame could not be encoded, or a result could not be decoded.
    Protocol,
    /// The daemon reported a failure for this call.
    Remote,
    /// No response arrived within the call's budget.
    Timeout,
}

/// The error returned by bridge calls.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// failed to connect, or the connection was lost.
    #[error("failed to communicate with daemon: {0}")]
    Connection(String),
    /// the bridge has been closed.
    #[error("bridge has been closed")]
    Closed,
    /// the daemon reported an error.
    #[error("daemon reported an error: {0}")]
    Remote(#[from] StorageError),
    /// no response within the budget.
    #[error("no response within {0:?}")]
    Timeout(Duration),
    /// failed to encode / decode content.
    #[error("failed to encode / decode content")]
    Encoding(#[from] serde_json::Error),
}

impl BridgeError {
    pub(crate) fn connection<S>(reason: S) -> Self
    where
        S: Into<String>,
    {
        Self::Connection(reason.into())
    }

    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection(_) | Self::Closed => ErrorKind::Connection,
            Self::Remote(_) => ErrorKind::Remote,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Encoding(_) => ErrorKind::Protocol,
        }
    }

    /// Returns the remote error code, if the daemon reported this error.
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Remote(m) => Some(m.code),
            _ => None,
        }
    }

    /// Returns the remote error details, if any.
    pub fn details(&self) -> Option<&Value> {
        match self {
            Self::Remote(m) => m.details.as_ref(),
            _ => None,
        }
    }
}

/// The result type returned by bridge calls.
pub type BridgeResult<T> = Result<T, BridgeError>;
