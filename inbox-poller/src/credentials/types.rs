//! Core credential types.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A credential expiring within this window is treated as expired.
pub const DEFAULT_EXPIRY_SKEW: Duration = Duration::seconds(60);

/// A renewable authentication token as persisted in `token.json`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Access token (API mode) or WebDriver session id (browser mode).
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Classification of a credential at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    /// Usable now.
    Valid,
    /// Expired, but a refresh token is present.
    Renewable,
    /// Must be re-acquired from scratch.
    Invalid,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            refresh_token: None,
            expiry: None,
            scopes: Vec::new(),
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    #[inline]
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// A credential without expiry metadata never expires on its own.
    pub fn is_expired_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.expiry.is_some_and(|expiry| expiry - skew <= now)
    }

    pub fn status_at(&self, now: DateTime<Utc>, skew: Duration) -> CredentialStatus {
        if !self.is_expired_at(now, skew) {
            CredentialStatus::Valid
        } else if self.has_refresh_token() {
            CredentialStatus::Renewable
        } else {
            CredentialStatus::Invalid
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("has_refresh_token", &self.has_refresh_token())
            .field("expiry", &self.expiry)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Lifecycle state of the authenticated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unestablished,
    Active,
    Stale,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unestablished => "unestablished",
            Self::Active => "active",
            Self::Stale => "stale",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated context handed to actions for one cycle.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthContext {
    token: String,
}

impl AuthContext {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Bearer token or browser session id.
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthContext(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let now = Utc::now();
        let valid = Credential::new("t").with_expiry(now + Duration::hours(1));
        assert_eq!(valid.status_at(now, DEFAULT_EXPIRY_SKEW), CredentialStatus::Valid);

        let renewable = Credential::new("t")
            .with_refresh_token("r")
            .with_expiry(now - Duration::minutes(1));
        assert_eq!(
            renewable.status_at(now, DEFAULT_EXPIRY_SKEW),
            CredentialStatus::Renewable
        );

        let invalid = Credential::new("t").with_expiry(now - Duration::minutes(1));
        assert_eq!(
            invalid.status_at(now, DEFAULT_EXPIRY_SKEW),
            CredentialStatus::Invalid
        );
    }

    #[test]
    fn test_expiry_within_skew_counts_as_expired() {
        let now = Utc::now();
        let credential = Credential::new("t").with_expiry(now + Duration::seconds(30));
        assert!(credential.is_expired_at(now, DEFAULT_EXPIRY_SKEW));
        assert!(!credential.is_expired_at(now, Duration::zero()));
    }

    #[test]
    fn test_no_expiry_never_expires() {
        let credential = Credential::new("session-id");
        assert!(!credential.is_expired_at(Utc::now(), DEFAULT_EXPIRY_SKEW));
    }

    #[test]
    fn test_json_field_names() {
        let expiry = DateTime::parse_from_rfc3339("2030-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let credential = Credential::new("at")
            .with_refresh_token("rt")
            .with_expiry(expiry)
            .with_scopes(vec!["s".to_string()]);

        let json: serde_json::Value = serde_json::to_value(&credential).unwrap();
        assert_eq!(json["token"], "at");
        assert_eq!(json["refresh_token"], "rt");
        assert_eq!(json["expiry"], "2030-01-02T03:04:05Z");
        assert_eq!(json["scopes"][0], "s");
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let credential = Credential::new("secret-access").with_refresh_token("secret-refresh");
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("secret"));
        assert!(!format!("{:?}", AuthContext::new("secret")).contains("secret"));
    }
}
