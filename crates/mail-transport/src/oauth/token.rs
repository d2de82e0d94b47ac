use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{ClientSecrets, OAuthError};

/// Successful token endpoint response.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Only present on the authorization code grant (and when Google rotates it).
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Space-separated granted scopes.
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenResponse {
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Exchange a refresh token for a new access token.
pub async fn refresh_access_token(
    client: &Client,
    secrets: &ClientSecrets,
    refresh_token: &str,
) -> Result<TokenResponse, OAuthError> {
    let params = [
        ("client_id", secrets.client_id.as_str()),
        ("client_secret", secrets.client_secret.as_str()),
        ("refresh_token", refresh_token),
        ("grant_type", "refresh_token"),
    ];

    request_token(client, &secrets.token_uri, &params).await
}

/// Exchange an authorization code (plus its PKCE verifier) for tokens.
pub async fn exchange_code(
    client: &Client,
    secrets: &ClientSecrets,
    code: &str,
    redirect_uri: &str,
    code_verifier: &str,
) -> Result<TokenResponse, OAuthError> {
    let params = [
        ("client_id", secrets.client_id.as_str()),
        ("client_secret", secrets.client_secret.as_str()),
        ("code", code),
        ("code_verifier", code_verifier),
        ("redirect_uri", redirect_uri),
        ("grant_type", "authorization_code"),
    ];

    request_token(client, &secrets.token_uri, &params).await
}

async fn request_token(
    client: &Client,
    token_uri: &str,
    params: &[(&str, &str)],
) -> Result<TokenResponse, OAuthError> {
    let response = client.post(token_uri).form(params).send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(match serde_json::from_str::<ErrorBody>(&body) {
            Ok(err) => OAuthError::Grant {
                error: err.error,
                description: err.error_description.unwrap_or_default(),
            },
            Err(_) => OAuthError::Grant {
                error: status.as_str().to_string(),
                description: body,
            },
        });
    }

    let tokens: TokenResponse =
        serde_json::from_str(&body).map_err(|e| OAuthError::Parse(e.to_string()))?;

    debug!(
        expires_in = ?tokens.expires_in,
        rotated_refresh_token = tokens.refresh_token.is_some(),
        "OAuth2 token grant succeeded"
    );

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Form, Json, Router};
    use serde_json::json;

    use super::*;
    use crate::test_utils::{spawn_server, test_client};

    fn secrets(token_uri: String) -> ClientSecrets {
        let mut secrets =
            ClientSecrets::from_json(r#"{"installed": {"client_id": "cid", "client_secret": "cs"}}"#)
                .unwrap();
        secrets.token_uri = token_uri;
        secrets
    }

    async fn token_endpoint(
        Form(form): Form<HashMap<String, String>>,
    ) -> (StatusCode, Json<serde_json::Value>) {
        match form.get("grant_type").map(String::as_str) {
            Some("refresh_token") if form.get("refresh_token").map(String::as_str) == Some("good") => (
                StatusCode::OK,
                Json(json!({
                    "access_token": "fresh",
                    "expires_in": 3599,
                    "scope": "https://www.googleapis.com/auth/gmail.readonly",
                    "token_type": "Bearer"
                })),
            ),
            Some("refresh_token") => (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "invalid_grant", "error_description": "Token has been expired or revoked."})),
            ),
            Some("authorization_code") if form.contains_key("code_verifier") => (
                StatusCode::OK,
                Json(json!({
                    "access_token": "first",
                    "refresh_token": "renewal",
                    "expires_in": 3599
                })),
            ),
            _ => (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_request"}))),
        }
    }

    async fn server() -> String {
        let app = Router::new().route("/token", post(token_endpoint));
        spawn_server(app).await
    }

    #[tokio::test]
    async fn test_refresh_access_token_success() {
        let base = server().await;
        let secrets = secrets(format!("{}/token", base));

        let tokens = refresh_access_token(&test_client(), &secrets, "good")
            .await
            .unwrap();

        assert_eq!(tokens.access_token, "fresh");
        assert_eq!(tokens.expires_in, Some(3599));
        assert!(tokens.refresh_token.is_none());
        assert_eq!(tokens.scopes().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_access_token_invalid_grant() {
        let base = server().await;
        let secrets = secrets(format!("{}/token", base));

        let err = refresh_access_token(&test_client(), &secrets, "revoked")
            .await
            .unwrap_err();

        assert!(err.is_invalid_grant());
    }

    #[tokio::test]
    async fn test_exchange_code_sends_verifier() {
        let base = server().await;
        let secrets = secrets(format!("{}/token", base));

        let tokens = exchange_code(
            &test_client(),
            &secrets,
            "code",
            "http://127.0.0.1:1/",
            "verifier",
        )
        .await
        .unwrap();

        assert_eq!(tokens.access_token, "first");
        assert_eq!(tokens.refresh_token.as_deref(), Some("renewal"));
    }
}
