use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// StorageError
// ---------------------------------------------------------------------------

/// Failure of the local durable store. There is no fallback beneath the local
/// cache, so these are fatal for the operation that hit them.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Local store error: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Local store corruption under key \"{key}\": {source}")]
    Corruption {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl StorageError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            source: None,
        }
    }
}

// ---------------------------------------------------------------------------
// RemoteError
// ---------------------------------------------------------------------------

/// Classification of remote store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// Network or server unavailability.
    Transient,
    /// The server rejected the payload. Still retried; see `SyncOptions::max_attempts`.
    Permanent,
    /// A session exists but was rejected (expired token, revoked grant).
    Auth,
    /// No user has ever signed in; the server cannot attribute ownership.
    NoSession,
    /// The call exceeded `SyncOptions::remote_timeout`.
    Timeout,
}

impl RemoteErrorKind {
    /// Whether a mutation failing with this kind can be deferred to the log.
    pub fn is_recoverable(self) -> bool {
        !matches!(self, Self::NoSession)
    }
}

/// Error returned by a [`RemoteStore`](crate::sync::RemoteStore) call.
#[derive(Debug, Clone)]
pub struct RemoteError {
    pub message: String,
    pub kind: RemoteErrorKind,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: RemoteErrorKind::Transient,
        }
    }

    pub fn with_kind(message: impl Into<String>, kind: RemoteErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RemoteError {}

// ---------------------------------------------------------------------------
// SyncError — top-level rollup
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Not signed in: {0}")]
    NotAuthenticated(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias — the default error type is `SyncError`.
pub type Result<T, E = SyncError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
