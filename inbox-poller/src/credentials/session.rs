//! Authenticated session lifecycle.
//!
//! State machine:
//!
//! ```text
//! Unestablished --acquire ok--> Active --expired / invalidate()--> Stale
//! Stale --renew ok--> Active
//! Stale --no refresh token / renew failed--> Unestablished
//! Unestablished --acquire failed--> Failed
//! ```
//!
//! A `Failed` session is retried from the top on the next `ensure_active`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use super::authenticator::Authenticator;
use super::error::AuthError;
use super::store::CredentialStore;
use super::types::{AuthContext, Credential, CredentialStatus, DEFAULT_EXPIRY_SKEW, SessionState};

/// Session tuning.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound for a single renew or acquire call.
    pub auth_timeout: Duration,
    /// Credentials expiring within this window count as expired.
    pub expiry_skew: chrono::Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auth_timeout: Duration::from_secs(300),
            expiry_skew: DEFAULT_EXPIRY_SKEW,
        }
    }
}

/// Owns the live credential and keeps it usable across polls.
pub struct AuthenticationSession {
    store: Arc<dyn CredentialStore>,
    authenticator: Arc<dyn Authenticator>,
    config: SessionConfig,
    state: SessionState,
    credential: Option<Credential>,
}

impl AuthenticationSession {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        authenticator: Arc<dyn Authenticator>,
        config: SessionConfig,
    ) -> Self {
        Self {
            store,
            authenticator,
            config,
            state: SessionState::Unestablished,
            credential: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Load the persisted credential. No network calls.
    pub async fn restore(&mut self) -> SessionState {
        let loaded = match self.store.load().await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(error = %e, "Failed to load persisted credential, starting unauthenticated");
                None
            }
        };

        self.state = match &loaded {
            None => SessionState::Unestablished,
            Some(credential) => match credential.status_at(Utc::now(), self.config.expiry_skew) {
                CredentialStatus::Valid => SessionState::Active,
                CredentialStatus::Renewable | CredentialStatus::Invalid => SessionState::Stale,
            },
        };
        self.credential = loaded;

        info!(
            state = %self.state,
            authenticator = self.authenticator.name(),
            "Session restored"
        );
        self.state
    }

    /// Force the next [`ensure_active`](Self::ensure_active) to renew or re-acquire.
    pub fn invalidate(&mut self, reason: &str) {
        match self.state {
            SessionState::Active => {
                info!(reason, "Session invalidated");
                self.state = SessionState::Stale;
            }
            state => debug!(reason, %state, "Invalidate on non-active session"),
        }
    }

    /// Return a usable context, renewing or re-acquiring the credential if needed.
    ///
    /// Renewal is tried first (when a refresh token exists), then a full
    /// acquisition; each at most once per call.
    #[instrument(skip(self), fields(authenticator = self.authenticator.name(), state = %self.state))]
    pub async fn ensure_active(&mut self) -> Result<AuthContext, AuthError> {
        if self.state == SessionState::Active {
            match &self.credential {
                Some(credential)
                    if !credential.is_expired_at(Utc::now(), self.config.expiry_skew) =>
                {
                    return Ok(AuthContext::new(&credential.token));
                }
                Some(_) => {
                    debug!("Credential expired");
                    self.state = SessionState::Stale;
                }
                None => self.state = SessionState::Unestablished,
            }
        }

        if let Some(current) = self.credential.clone().filter(Credential::has_refresh_token) {
            match self.renew(&current).await {
                Ok(renewed) => return Ok(self.adopt(renewed, "renewed").await),
                Err(e) => {
                    if e.requires_reacquire() {
                        warn!(error = %e, "Refresh token unusable, re-acquisition required");
                        if let Some(credential) = self.credential.as_mut() {
                            credential.refresh_token = None;
                        }
                    } else {
                        warn!(error = %e, "Credential renewal failed, falling back to re-acquisition");
                    }
                }
            }
        } else if self.state == SessionState::Stale {
            debug!("No refresh token, re-acquisition required");
        }
        self.state = SessionState::Unestablished;

        match self.acquire().await {
            Ok(acquired) => Ok(self.adopt(acquired, "acquired").await),
            Err(e) => {
                error!(error = %e, "Authentication failed");
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    async fn renew(&self, current: &Credential) -> Result<Credential, AuthError> {
        info!("Renewing credential");
        let after = self.config.auth_timeout;
        let mut renewed = tokio::time::timeout(after, self.authenticator.renew(current))
            .await
            .map_err(|_| AuthError::Timeout {
                operation: "renew",
                after,
            })??;

        if renewed.refresh_token.is_none() {
            renewed.refresh_token = current.refresh_token.clone();
        }
        Ok(renewed)
    }

    async fn acquire(&self) -> Result<Credential, AuthError> {
        info!("Acquiring new credential");
        let after = self.config.auth_timeout;
        tokio::time::timeout(after, self.authenticator.acquire(self.credential.clone()))
            .await
            .map_err(|_| AuthError::Timeout {
                operation: "acquire",
                after,
            })?
    }

    /// Persist and activate a new credential.
    async fn adopt(&mut self, credential: Credential, how: &'static str) -> AuthContext {
        if let Err(e) = self.store.save(&credential).await {
            error!(
                error = %e,
                "Failed to persist credential; next restart will need re-authentication"
            );
        }

        info!(how, expiry = ?credential.expiry, "Session active");
        let context = AuthContext::new(&credential.token);
        self.credential = Some(credential);
        self.state = SessionState::Active;
        context
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use mockall::predicate::always;

    use super::*;
    use crate::credentials::authenticator::MockAuthenticator;
    use crate::credentials::store::MemoryCredentialStore;
    use crate::test_utils::FailingStore;

    fn fresh(token: &str) -> Credential {
        Credential::new(token).with_expiry(Utc::now() + ChronoDuration::hours(1))
    }

    fn expired(token: &str) -> Credential {
        Credential::new(token)
            .with_refresh_token("refresh")
            .with_expiry(Utc::now() - ChronoDuration::hours(1))
    }

    fn mock() -> MockAuthenticator {
        let mut auth = MockAuthenticator::new();
        auth.expect_name().return_const("mock");
        auth
    }

    fn session(store: Arc<dyn CredentialStore>, auth: MockAuthenticator) -> AuthenticationSession {
        AuthenticationSession::new(store, Arc::new(auth), SessionConfig::default())
    }

    #[tokio::test]
    async fn test_restore_classifies_persisted_credential() {
        let store = Arc::new(MemoryCredentialStore::with_credential(fresh("a")));
        assert_eq!(session(store, mock()).restore().await, SessionState::Active);

        let store = Arc::new(MemoryCredentialStore::with_credential(expired("a")));
        assert_eq!(session(store, mock()).restore().await, SessionState::Stale);

        let store = Arc::new(MemoryCredentialStore::new());
        assert_eq!(session(store, mock()).restore().await, SessionState::Unestablished);
    }

    #[tokio::test]
    async fn test_restore_unreadable_store_is_unestablished() {
        let mut session = session(Arc::new(FailingStore::default()), mock());
        assert_eq!(session.restore().await, SessionState::Unestablished);
        assert!(session.credential().is_none());
    }

    #[tokio::test]
    async fn test_ensure_active_is_noop_when_valid() {
        let mut auth = mock();
        auth.expect_renew().never();
        auth.expect_acquire().never();

        let store = Arc::new(MemoryCredentialStore::with_credential(fresh("a")));
        let mut session = session(store, auth);
        session.restore().await;

        assert_eq!(session.ensure_active().await.unwrap().token(), "a");
        assert_eq!(session.ensure_active().await.unwrap().token(), "a");
    }

    #[tokio::test]
    async fn test_expired_credential_is_renewed_and_keeps_refresh_token() {
        let mut auth = mock();
        auth.expect_renew()
            .times(1)
            .returning(|_| Ok(fresh("renewed")));
        auth.expect_acquire().never();

        let store = Arc::new(MemoryCredentialStore::with_credential(expired("old")));
        let mut session = session(store.clone(), auth);
        session.restore().await;

        assert_eq!(session.ensure_active().await.unwrap().token(), "renewed");
        assert_eq!(session.state(), SessionState::Active);

        let saved = store.snapshot().unwrap();
        assert_eq!(saved.token, "renewed");
        assert_eq!(saved.refresh_token.as_deref(), Some("refresh"));
    }

    #[tokio::test]
    async fn test_rejected_renewal_falls_back_to_acquire() {
        let mut auth = mock();
        auth.expect_renew()
            .times(1)
            .returning(|_| Err(AuthError::Rejected("invalid_grant".into())));
        auth.expect_acquire()
            .with(always())
            .times(1)
            .returning(|_| Ok(fresh("acquired").with_refresh_token("new-refresh")));

        let store = Arc::new(MemoryCredentialStore::with_credential(expired("old")));
        let mut session = session(store.clone(), auth);
        session.restore().await;

        assert_eq!(session.ensure_active().await.unwrap().token(), "acquired");
        assert_eq!(
            store.snapshot().and_then(|c| c.refresh_token).as_deref(),
            Some("new-refresh")
        );
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token_acquires() {
        let mut auth = mock();
        auth.expect_renew().never();
        auth.expect_acquire()
            .times(1)
            .returning(|previous| {
                assert_eq!(previous.map(|c| c.token).as_deref(), Some("old"));
                Ok(fresh("acquired"))
            });

        let old = Credential::new("old").with_expiry(Utc::now() - ChronoDuration::hours(1));
        let store = Arc::new(MemoryCredentialStore::with_credential(old));
        let mut session = session(store, auth);
        session.restore().await;

        assert_eq!(session.ensure_active().await.unwrap().token(), "acquired");
    }

    #[tokio::test]
    async fn test_acquire_failure_marks_failed_then_retries() {
        let mut auth = mock();
        let mut calls = 0;
        auth.expect_acquire().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(AuthError::AcquireFailed("user closed the browser".into()))
            } else {
                Ok(fresh("second"))
            }
        });

        let mut session = session(Arc::new(MemoryCredentialStore::new()), auth);
        session.restore().await;

        assert!(matches!(
            session.ensure_active().await,
            Err(AuthError::AcquireFailed(_))
        ));
        assert_eq!(session.state(), SessionState::Failed);

        assert_eq!(session.ensure_active().await.unwrap().token(), "second");
        assert_eq!(session.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn test_invalidate_forces_renewal_despite_valid_expiry() {
        let mut auth = mock();
        auth.expect_renew()
            .times(1)
            .returning(|_| Ok(fresh("renewed")));

        let store = Arc::new(MemoryCredentialStore::with_credential(
            fresh("a").with_refresh_token("r"),
        ));
        let mut session = session(store, auth);
        session.restore().await;

        session.invalidate("401 from strategy");
        assert_eq!(session.state(), SessionState::Stale);
        assert_eq!(session.ensure_active().await.unwrap().token(), "renewed");
    }

    #[tokio::test]
    async fn test_save_failure_does_not_fail_ensure_active() {
        let mut auth = mock();
        auth.expect_acquire()
            .times(1)
            .returning(|_| Ok(fresh("acquired")));

        let store = Arc::new(FailingStore::default());
        let mut first = session(store.clone(), auth);
        first.restore().await;

        assert_eq!(first.ensure_active().await.unwrap().token(), "acquired");
        assert_eq!(store.save_attempts(), 1);

        // Nothing was persisted: a new session must acquire again.
        let mut auth = mock();
        auth.expect_acquire()
            .times(1)
            .returning(|_| Ok(fresh("again")));
        let mut restarted = session(store, auth);
        assert_eq!(restarted.restore().await, SessionState::Unestablished);
        assert_eq!(restarted.ensure_active().await.unwrap().token(), "again");
    }

    #[tokio::test]
    async fn test_renew_timeout_is_reported() {
        struct Slow;

        #[async_trait::async_trait]
        impl Authenticator for Slow {
            fn name(&self) -> &'static str {
                "slow"
            }

            async fn renew(&self, _current: &Credential) -> Result<Credential, AuthError> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Credential::new("late"))
            }

            async fn acquire(&self, _previous: Option<Credential>) -> Result<Credential, AuthError> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Credential::new("late"))
            }
        }

        let store = Arc::new(MemoryCredentialStore::with_credential(expired("old")));
        let config = SessionConfig {
            auth_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let mut session = AuthenticationSession::new(store, Arc::new(Slow), config);
        session.restore().await;

        let err = session.ensure_active().await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Timeout {
                operation: "acquire",
                ..
            }
        ));
        assert_eq!(session.state(), SessionState::Failed);
    }
}
