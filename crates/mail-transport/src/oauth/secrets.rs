use std::fmt;
use std::path::Path;

use serde::Deserialize;

use super::OAuthError;

pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// OAuth2 client registration, as found in `credentials.json`.
#[derive(Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

/// The console wraps the registration in an `installed` (desktop) or `web` section.
#[derive(Deserialize)]
struct SecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn from_json(json: &str) -> Result<Self, OAuthError> {
        let file: SecretsFile =
            serde_json::from_str(json).map_err(|e| OAuthError::Parse(e.to_string()))?;

        file.installed.or(file.web).ok_or_else(|| {
            OAuthError::Parse(
                "client secrets must contain an `installed` or `web` section".to_string(),
            )
        })
    }

    pub async fn load(path: &Path) -> Result<Self, OAuthError> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| OAuthError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json(&json)
    }
}

impl fmt::Debug for ClientSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecrets")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}
