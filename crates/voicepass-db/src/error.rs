//! Error types for the profile store.
//!
//! All errors are propagated via [`DbError`], which wraps the underlying
//! [`fred`] and [`serde_json`] errors and adds the store-level conditions
//! (missing or duplicate profile, unavailable backend, call timeout).

use voicepass_types::MemberId;

/// Errors that can occur in the profile store.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The profile does not exist.
    #[error("profile not found: {0}")]
    NotFound(MemberId),

    /// `create` was called for a profile that already exists.
    #[error("profile already exists: {0}")]
    AlreadyExists(MemberId),

    /// The backend refused the call (connection down, injected outage).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within the store timeout.
    #[error("store call {operation} timed out after {after_ms}ms")]
    Timeout {
        /// Which store operation timed out.
        operation: &'static str,
        /// The configured timeout.
        after_ms: u64,
    },

    /// A stored field could not be parsed back.
    #[error("corrupt field {field} in {key}: {detail}")]
    Corrupt {
        /// The store key.
        key: String,
        /// The field that failed to parse.
        field: &'static str,
        /// Parse error description.
        detail: String,
    },

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DbError {
    /// Whether retrying the same call later may succeed.
    ///
    /// Transient backend conditions are retryable; logical conditions
    /// (missing/duplicate profile, corrupt data, bad config) are not.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Dragonfly(_) | Self::Unavailable(_) | Self::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(DbError::Unavailable("down".to_owned()).is_retryable());
        assert!(
            DbError::Timeout {
                operation: "find",
                after_ms: 5000
            }
            .is_retryable()
        );
        assert!(!DbError::NotFound(MemberId(1)).is_retryable());
        assert!(!DbError::AlreadyExists(MemberId(1)).is_retryable());
    }
}
