use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Well-known storage error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode;

impl ErrorCode {
    /// The input failed validation.
    pub const VALIDATION: i64 = 400;
    /// The caller is not authenticated.
    pub const UNAUTHORIZED: i64 = 401;
    /// The caller is not allowed to perform the operation.
    pub const FORBIDDEN: i64 = 403;
    /// The record does not exist.
    pub const NOT_FOUND: i64 = 404;
    /// The record already exists.
    pub const CONFLICT: i64 = 409;
    /// The adapter failed unexpectedly.
    pub const INTERNAL: i64 = 500;
    /// The requested operation is not known to the daemon.
    pub const UNKNOWN_METHOD: i64 = 501;
}

/// An error reported by a storage adapter.
///
/// This is also the `error` object of a failed response frame.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message} (code {code})")]
pub struct StorageError {
    /// The error code, see [`ErrorCode`].
    pub code: i64,
    /// A human readable message.
    pub message: String,
    /// Optional structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// The result type returned by storage adapters.
pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    /// Creates an error with the given code and message.
    pub fn new<S>(code: i64, message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attaches structured details.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);

        self
    }

    #[allow(missing_docs)]
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorCode::VALIDATION, message)
    }

    #[allow(missing_docs)]
    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorCode::UNAUTHORIZED, message)
    }

    #[allow(missing_docs)]
    pub fn forbidden<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorCode::FORBIDDEN, message)
    }

    #[allow(missing_docs)]
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorCode::NOT_FOUND, message)
    }

    #[allow(missing_docs)]
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorCode::CONFLICT, message)
    }

    #[allow(missing_docs)]
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorCode::INTERNAL, message)
    }

    #[allow(missing_docs)]
    pub fn unknown_method<S: Into<String>>(method: S) -> Self {
        Self::new(
            ErrorCode::UNKNOWN_METHOD,
            format!("unknown method: {}", method.into()),
        )
    }
}
