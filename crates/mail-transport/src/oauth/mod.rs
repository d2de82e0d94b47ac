//! Google OAuth2 for installed applications.
//!
//! This module implements the pieces of the flow used by the poller:
//! 1. **Client secrets** from the `credentials.json` downloaded from the Cloud console
//! 2. **Refresh** via the `refresh_token` grant
//! 3. **Authorize** via the loopback redirect flow with PKCE (interactive, one-off)

mod installed_flow;
mod secrets;
mod token;

use std::path::PathBuf;

use thiserror::Error;

pub use installed_flow::{InstalledFlow, PendingAuthorization};
pub use secrets::{ClientSecrets, GOOGLE_AUTH_URI, GOOGLE_TOKEN_URI};
pub use token::{TokenResponse, exchange_code, refresh_access_token};

/// Read-only Gmail scope.
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Token endpoint error ({error}): {description}")]
    Grant { error: String, description: String },
    #[error("Authorization denied: {0}")]
    Denied(String),
    #[error("Authorization response state mismatch")]
    StateMismatch,
    #[error("Loopback listener error: {0}")]
    Listener(std::io::Error),
}

impl OAuthError {
    /// The grant was rejected by the token endpoint (revoked or expired refresh token).
    pub fn is_invalid_grant(&self) -> bool {
        matches!(self, Self::Grant { error, .. } if error == "invalid_grant" || error == "unauthorized_client")
    }
}
