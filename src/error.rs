//! Error Types
//!
//! Everything a store operation can fail with. Backends report
//! [`BackendError`], the serialization layer reports [`CodecError`], and the
//! runtime surfaces both (plus its own conditions) as [`StoreError`].
//!
//! "Not found" is deliberately absent from this list: `fetch` returns
//! `Ok(None)` for a missing key. Only the strict operations turn absence into
//! [`StoreError::KeyNotFound`].

use crate::term::Term;
use std::fmt;
use std::time::Duration;

/// Errors returned by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A strict operation required a key that is not present
    #[error("key not found: {0}")]
    KeyNotFound(Term),

    /// `bump_strict` on a non-integer value, or an overflowing bump
    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    /// The backend adapter reported a failure
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A key or value could not be encoded or decoded
    #[error("serialization error: {0}")]
    Codec(#[from] CodecError),

    /// An enumeration operation was sent to a non-enumerable backend
    #[error("backend does not support enumeration")]
    EnumerationUnsupported,

    /// An expiry operation was sent to a store started without expiry
    #[error("expiry is not enabled for this store")]
    ExpiryDisabled,

    /// The store's expiry engine is no longer running, so timers can no
    /// longer be set or cancelled
    #[error("expiry engine has stopped")]
    ExpiryStopped,

    /// Adapter setup (or seeding) failed; the store never became ready
    #[error("store initialization failed: {0}")]
    Init(String),

    /// The store runtime has terminated
    #[error("store is closed")]
    Closed,

    /// The store dropped the request without answering (a caller-supplied
    /// function panicked while the request was processed)
    #[error("request aborted by the store")]
    Aborted,

    /// The caller stopped waiting for the reply
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// A registry already holds a live store under this name
    #[error("store name already registered: {0}")]
    AlreadyRegistered(String),
}

/// A failure reported by a backend adapter.
///
/// Adapters only see serialized keys, so they usually leave `key` empty; the
/// runtime fills in the logical key before the error reaches the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct BackendError {
    message: String,
    key: Option<Term>,
}

impl BackendError {
    /// Creates a backend error with a diagnostic message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            key: None,
        }
    }

    /// Attaches the logical key the failed operation was working on.
    pub fn with_key(mut self, key: Term) -> Self {
        self.key = Some(key);
        self
    }

    /// Attaches `key` unless the error already names one.
    pub(crate) fn or_key(self, key: &Term) -> Self {
        if self.key.is_some() {
            self
        } else {
            self.with_key(key.clone())
        }
    }

    /// The adapter's diagnostic message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The logical key involved, if known.
    pub fn key(&self) -> Option<&Term> {
        self.key.as_ref()
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "backend error on key {}: {}", key, self.message),
            None => write!(f, "backend error: {}", self.message),
        }
    }
}

/// Errors from the serialization layer.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("bincode: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("compression: {0}")]
    Io(#[from] std::io::Error),

    #[error("empty payload")]
    Empty,

    #[error("unknown payload format: {0:#04x}")]
    UnknownFormat(u8),
}

/// The typed result of a non-strict `bump` on a value that is not an integer.
///
/// The store is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("value at key {key} is not an integer")]
pub struct NoInteger {
    pub key: Term,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::new("connection refused");
        assert_eq!(err.to_string(), "backend error: connection refused");

        let err = err.with_key(Term::from("k"));
        assert_eq!(
            err.to_string(),
            "backend error on key \"k\": connection refused"
        );
    }

    #[test]
    fn test_or_key_keeps_existing_key() {
        let err = BackendError::new("boom").with_key(Term::from(1));
        let err = err.or_key(&Term::from(2));
        assert_eq!(err.key(), Some(&Term::from(1)));

        let err = BackendError::new("boom").or_key(&Term::from(2));
        assert_eq!(err.key(), Some(&Term::from(2)));
    }

    #[test]
    fn test_store_error_is_transparent_for_backend() {
        let err: StoreError = BackendError::new("disk full").into();
        assert_eq!(err.to_string(), "backend error: disk full");
    }
}
