//! Credential error types.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while establishing or renewing an authenticated session.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The credential was rejected (revoked, expired refresh token).
    #[error("Credential rejected: {0}")]
    Rejected(String),

    /// No refresh token available; full re-acquisition required.
    #[error("Missing refresh token - re-acquisition required")]
    MissingRefreshToken,

    #[error("Renewal failed: {0}")]
    RenewFailed(String),

    #[error("Acquisition failed: {0}")]
    AcquireFailed(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Network or protocol failure talking to the identity provider.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl AuthError {
    /// Renewal cannot succeed with this credential; acquire a new one.
    pub fn requires_reacquire(&self) -> bool {
        matches!(self, Self::Rejected(_) | Self::MissingRefreshToken)
    }

    /// Check if this error is transient and may be retried next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }
}

/// Errors from a [`CredentialStore`](super::CredentialStore).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Credential file {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize credential: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to replace {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
