//! Loopback redirect flow for installed applications.
//!
//! The user opens the authorization URL in a browser; Google redirects back to
//! `http://127.0.0.1:<port>/` with the authorization code, which is then
//! exchanged for tokens. The verifier never leaves this process (PKCE S256).

use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info};
use url::Url;

use super::{ClientSecrets, OAuthError, TokenResponse, exchange_code};

const SUCCESS_PAGE: &str = "<html><body><h3>Authorization complete.</h3>\
    <p>You may close this window and return to inbox-poller.</p></body></html>";
const FAILURE_PAGE: &str = "<html><body><h3>Authorization failed.</h3>\
    <p>Check the inbox-poller log for details.</p></body></html>";

/// Builder for the installed-app authorization flow.
pub struct InstalledFlow<'a> {
    secrets: &'a ClientSecrets,
    scopes: Vec<String>,
}

/// An authorization waiting for the browser redirect.
pub struct PendingAuthorization {
    url: String,
    redirect_uri: String,
    state: String,
    verifier: String,
    listener: TcpListener,
}

#[derive(Debug, Default, Deserialize)]
struct RedirectParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Shared with the redirect handler. Only the first authorization response is delivered.
struct RedirectContext {
    expected_state: String,
    result_tx: Mutex<Option<oneshot::Sender<Result<String, OAuthError>>>>,
}

impl RedirectContext {
    fn complete(&self, result: Result<String, OAuthError>) {
        if let Some(tx) = self.result_tx.lock().take() {
            let _ = tx.send(result);
        }
    }
}

async fn handle_redirect(
    State(ctx): State<Arc<RedirectContext>>,
    Query(params): Query<RedirectParams>,
) -> (StatusCode, Html<&'static str>) {
    if params.code.is_none() && params.error.is_none() {
        return (StatusCode::NOT_FOUND, Html(""));
    }

    if params.state.as_deref() != Some(ctx.expected_state.as_str()) {
        ctx.complete(Err(OAuthError::StateMismatch));
        return (StatusCode::BAD_REQUEST, Html(FAILURE_PAGE));
    }

    match (params.code, params.error) {
        (_, Some(error)) => {
            ctx.complete(Err(OAuthError::Denied(error)));
            (StatusCode::OK, Html(FAILURE_PAGE))
        }
        (Some(code), None) => {
            ctx.complete(Ok(code));
            (StatusCode::OK, Html(SUCCESS_PAGE))
        }
        (None, None) => (StatusCode::NOT_FOUND, Html("")),
    }
}

fn random_token(len: usize) -> String {
    let bytes: Vec<u8> = (0..len).map(|_| rand::random::<u8>()).collect();
    URL_SAFE_NO_PAD.encode(bytes)
}

fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

impl<'a> InstalledFlow<'a> {
    pub fn new(secrets: &'a ClientSecrets, scopes: &[&str]) -> Self {
        Self {
            secrets,
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Bind the loopback listener and build the authorization URL.
    pub async fn start(&self) -> Result<PendingAuthorization, OAuthError> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(OAuthError::Listener)?;
        let port = listener.local_addr().map_err(OAuthError::Listener)?.port();
        let redirect_uri = format!("http://127.0.0.1:{}/", port);

        let state = random_token(16);
        let verifier = random_token(48);
        let challenge = code_challenge(&verifier);
        let scope = self.scopes.join(" ");

        let url = Url::parse_with_params(
            &self.secrets.auth_uri,
            &[
                ("client_id", self.secrets.client_id.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("state", state.as_str()),
                ("code_challenge", challenge.as_str()),
                ("code_challenge_method", "S256"),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| OAuthError::Parse(format!("invalid auth_uri: {}", e)))?;

        debug!(%redirect_uri, "Loopback listener ready for OAuth2 redirect");

        Ok(PendingAuthorization {
            url: url.to_string(),
            redirect_uri,
            state,
            verifier,
            listener,
        })
    }
}

impl PendingAuthorization {
    /// URL the user must open to grant access.
    pub fn authorization_url(&self) -> &str {
        &self.url
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Wait for the redirect and exchange the code for tokens.
    ///
    /// Has no timeout of its own; callers bound it. Dropping the future stops
    /// the loopback server.
    pub async fn finish(
        self,
        client: &Client,
        secrets: &ClientSecrets,
    ) -> Result<TokenResponse, OAuthError> {
        let Self {
            redirect_uri,
            state,
            verifier,
            listener,
            ..
        } = self;

        let (result_tx, result_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let ctx = Arc::new(RedirectContext {
            expected_state: state,
            result_tx: Mutex::new(Some(result_tx)),
        });
        let app = Router::new()
            .route("/", get(handle_redirect))
            .with_state(ctx);

        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    // Fires on success and when `finish` is dropped.
                    let _ = shutdown_rx.await;
                    debug!("OAuth2 redirect listener shutting down");
                })
                .await
        });

        let received = result_rx.await;
        let _ = shutdown_tx.send(());

        let code = match received {
            Ok(result) => result?,
            Err(_) => {
                let err = match server.await {
                    Ok(Err(e)) => e,
                    _ => std::io::Error::other("redirect listener stopped"),
                };
                return Err(OAuthError::Listener(err));
            }
        };

        info!("Authorization code received, exchanging for tokens");
        exchange_code(client, secrets, &code, &redirect_uri, &verifier).await
    }
}
