//! Google OAuth2 authenticator.
//!
//! Delegates to the transport crate:
//! - Renewal: `refresh_token` grant
//! - Acquisition: installed-app loopback flow (interactive)

use async_trait::async_trait;
use chrono::{Duration, Utc};
use mail_transport::oauth::{
    ClientSecrets, InstalledFlow, OAuthError, TokenResponse, refresh_access_token,
};
use reqwest::Client;
use tracing::{info, instrument, warn};

use crate::credentials::authenticator::Authenticator;
use crate::credentials::error::AuthError;
use crate::credentials::types::Credential;

pub struct GoogleAuthenticator {
    client: Client,
    secrets: ClientSecrets,
    scopes: Vec<String>,
}

fn map_oauth_error(err: OAuthError, during_renew: bool) -> AuthError {
    if err.is_invalid_grant() {
        return AuthError::Rejected(err.to_string());
    }
    match err {
        OAuthError::Network(e) => AuthError::Transport(e.to_string()),
        OAuthError::Listener(e) => AuthError::Transport(format!("loopback listener: {}", e)),
        other if during_renew => AuthError::RenewFailed(other.to_string()),
        other => AuthError::AcquireFailed(other.to_string()),
    }
}

impl GoogleAuthenticator {
    pub fn new(client: Client, secrets: ClientSecrets, scopes: Vec<String>) -> Self {
        Self {
            client,
            secrets,
            scopes,
        }
    }

    fn to_credential(&self, tokens: TokenResponse) -> Credential {
        let scopes = match tokens.scopes() {
            granted if granted.is_empty() => self.scopes.clone(),
            granted => granted,
        };
        let expiry = tokens
            .expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .map(|secs| Utc::now() + Duration::seconds(secs));

        Credential {
            token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expiry,
            scopes,
        }
    }
}

#[async_trait]
impl Authenticator for GoogleAuthenticator {
    fn name(&self) -> &'static str {
        "google"
    }

    #[instrument(skip_all)]
    async fn renew(&self, current: &Credential) -> Result<Credential, AuthError> {
        let refresh_token = current
            .refresh_token
            .as_deref()
            .ok_or(AuthError::MissingRefreshToken)?;

        let tokens = refresh_access_token(&self.client, &self.secrets, refresh_token)
            .await
            .map_err(|e| map_oauth_error(e, true))?;

        info!(expires_in = ?tokens.expires_in, "Access token refreshed");
        Ok(self.to_credential(tokens))
    }

    #[instrument(skip_all)]
    async fn acquire(&self, _previous: Option<Credential>) -> Result<Credential, AuthError> {
        let scopes: Vec<&str> = self.scopes.iter().map(String::as_str).collect();
        let pending = InstalledFlow::new(&self.secrets, &scopes)
            .start()
            .await
            .map_err(|e| map_oauth_error(e, false))?;

        warn!(
            url = pending.authorization_url(),
            "Authorization required: open the URL in a browser to grant access"
        );
        eprintln!(
            "\nPlease visit this URL to authorize inbox-poller:\n\n{}\n",
            pending.authorization_url()
        );

        let tokens = pending
            .finish(&self.client, &self.secrets)
            .await
            .map_err(|e| map_oauth_error(e, false))?;

        if tokens.refresh_token.is_none() {
            warn!("Authorization returned no refresh token; the session cannot renew silently");
        }
        info!("Authorization completed");
        Ok(self.to_credential(tokens))
    }
}
