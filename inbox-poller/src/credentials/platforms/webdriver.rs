//! Browser session authenticator.
//!
//! The credential is a WebDriver session id. There is nothing to renew: a dead
//! session is replaced by a new one, and the user signs in interactively when
//! the browser profile holds no login.

use std::time::Duration;

use async_trait::async_trait;
use mail_transport::webdriver::{SessionOptions, WebDriverClient, WebDriverError};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::credentials::authenticator::Authenticator;
use crate::credentials::error::AuthError;
use crate::credentials::types::Credential;

/// Host the browser sits on while the user still has to sign in.
pub const GOOGLE_SIGN_IN_HOST: &str = "accounts.google.com";

pub struct WebDriverAuthenticator {
    driver: WebDriverClient,
    options: SessionOptions,
    target_url: String,
    sign_in_host: String,
    poll_interval: Duration,
    /// Session created by an acquisition that has not completed yet.
    pending_session: Mutex<Option<String>>,
}

fn map_webdriver_error(err: WebDriverError) -> AuthError {
    match err {
        WebDriverError::Network(e) => AuthError::Transport(e.to_string()),
        other => AuthError::AcquireFailed(other.to_string()),
    }
}

impl WebDriverAuthenticator {
    pub fn new(
        driver: WebDriverClient,
        options: SessionOptions,
        target_url: impl Into<String>,
    ) -> Self {
        Self {
            driver,
            options,
            target_url: target_url.into(),
            sign_in_host: GOOGLE_SIGN_IN_HOST.to_string(),
            poll_interval: Duration::from_secs(2),
            pending_session: Mutex::new(None),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Best-effort removal of a browser session.
    async fn discard_session(&self, session_id: &str, what: &'static str) {
        match self.driver.delete_session(session_id).await {
            Ok(()) => debug!(session_id, what, "Deleted browser session"),
            Err(e) => debug!(session_id, what, error = %e, "Failed to delete browser session"),
        }
    }

    /// Navigate to the target and wait for the user to be signed in.
    async fn prepare_session(&self, session_id: &str) -> Result<(), AuthError> {
        self.driver
            .navigate(session_id, &self.target_url)
            .await
            .map_err(map_webdriver_error)?;
        self.wait_for_sign_in(session_id).await
    }

    fn on_sign_in_page(&self, current_url: &str) -> bool {
        Url::parse(current_url)
            .ok()
            .and_then(|url| url.host_str().map(|h| h == self.sign_in_host))
            .unwrap_or(false)
    }

    /// Wait until the user has left the sign-in page. Unbounded; the session times it out.
    async fn wait_for_sign_in(&self, session_id: &str) -> Result<(), AuthError> {
        let mut prompted = false;
        loop {
            let current = self
                .driver
                .current_url(session_id)
                .await
                .map_err(map_webdriver_error)?;

            if !self.on_sign_in_page(&current) {
                if prompted {
                    info!("Interactive sign-in completed");
                }
                return Ok(());
            }

            if !prompted {
                warn!("Sign-in required: complete the login in the browser window");
                prompted = true;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl Authenticator for WebDriverAuthenticator {
    fn name(&self) -> &'static str {
        "webdriver"
    }

    async fn renew(&self, _current: &Credential) -> Result<Credential, AuthError> {
        Err(AuthError::MissingRefreshToken)
    }

    #[instrument(skip_all, fields(driver = self.driver.base_url()))]
    async fn acquire(&self, previous: Option<Credential>) -> Result<Credential, AuthError> {
        // Left behind by an attempt that failed or was timed out.
        let abandoned = self.pending_session.lock().take();
        if let Some(abandoned) = &abandoned {
            self.discard_session(abandoned, "abandoned").await;
        }

        if let Some(previous) = previous
            && abandoned.as_deref() != Some(previous.token.as_str())
        {
            // The old session is usually already gone.
            self.discard_session(&previous.token, "previous").await;
        }

        let session_id = self
            .driver
            .new_session(&self.options)
            .await
            .map_err(map_webdriver_error)?;
        *self.pending_session.lock() = Some(session_id.clone());

        if let Err(e) = self.prepare_session(&session_id).await {
            self.pending_session.lock().take();
            self.discard_session(&session_id, "failed").await;
            return Err(e);
        }

        self.pending_session.lock().take();
        info!(session_id = %session_id, "Browser session ready");
        Ok(Credential::new(session_id))
    }
}
