//! Error types for secret store operations.
//!
//! A store operation either succeeds, reports an explicit "key absent"
//! (`Ok(None)` at the call site), or fails with a [`StoreError`]. Every
//! `StoreError` is an I/O-class failure: callers must never treat one as
//! "does not exist".

use thiserror::Error;

/// Errors raised by a [`SecretStore`](crate::SecretStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The configured store address could not be parsed or joined.
    #[error("Invalid store address {address}: {source}")]
    InvalidAddress {
        /// The offending address or path.
        address: String,
        /// Underlying parse error.
        #[source]
        source: url::ParseError,
    },

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// The request never produced a response (connection, TLS, timeout).
    #[error("Request for {path} failed: {source}")]
    Transport {
        /// Logical path of the request.
        path: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The store answered with a non-success status other than "not found".
    #[error("Store returned HTTP {status} for {path}: {errors:?}")]
    Http {
        /// Logical path of the request.
        path: String,
        /// HTTP status code.
        status: u16,
        /// Error messages reported by the store, if any.
        errors: Vec<String>,
    },

    /// The store answered, but the payload did not have the expected shape.
    #[error("Malformed response for {path}: {reason}")]
    Malformed {
        /// Logical path of the request.
        path: String,
        /// What was wrong with the payload.
        reason: String,
    },

    /// An entry could not be serialized to its canonical representation.
    #[error("Failed to encode entry: {0}")]
    Encode(#[from] serde_json::Error),

    /// The store is unreachable for a reason not covered above.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Returns the HTTP status code, if the store produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Http { status, .. } => Some(*status),
            StoreError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns true if the store rejected the credential.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
