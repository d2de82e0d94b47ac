//! Platform-specific authentication protocol.

use async_trait::async_trait;

use super::error::AuthError;
use super::types::Credential;

/// Renew / acquire protocol of one identity provider.
///
/// Implementations perform no timeout handling of their own; the session
/// bounds every call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Identifier used in logs (e.g. "google", "webdriver").
    fn name(&self) -> &'static str;

    /// Exchange the renewal token of `current` for a fresh credential.
    ///
    /// The returned credential may omit the refresh token; the session then
    /// keeps the previous one.
    async fn renew(&self, current: &Credential) -> Result<Credential, AuthError>;

    /// Establish a credential from scratch. May require user interaction.
    async fn acquire(&self, previous: Option<Credential>) -> Result<Credential, AuthError>;
}
