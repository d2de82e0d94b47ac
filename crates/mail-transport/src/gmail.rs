//! Gmail REST API client.
//!
//! Only the two read calls the poller needs:
//! - `GET /users/me/messages`: message ids matching a search / label filter
//! - `GET /users/me/messages/{id}?format=metadata`: From / Subject / Date headers

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// Headers requested with `format=metadata`.
const METADATA_HEADERS: [&str; 3] = ["From", "Subject", "Date"];

#[derive(Debug, Error)]
pub enum GmailError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Gmail API error (status={status}): {message}")]
    Api { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
}

impl GmailError {
    /// HTTP status of an API error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            Self::Parse(_) => None,
        }
    }

    /// The access token was rejected or lacks the required scope.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }

    /// The request shape is not valid for this account (unknown label, bad query).
    pub fn is_not_applicable(&self) -> bool {
        matches!(self.status(), Some(400 | 404))
    }
}

/// Filters for `users.messages.list`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Gmail search expression (`q`).
    pub q: Option<String>,
    /// Every label must match (`labelIds`, repeated).
    pub label_ids: Vec<String>,
    pub max_results: u32,
}

/// A message reference as returned by the list call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub id: String,
    #[serde(rename = "threadId", default)]
    pub thread_id: String,
}

/// Selected headers of one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageMetadata {
    pub id: String,
    pub from: Option<String>,
    pub subject: Option<String>,
    pub date: Option<String>,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Deserialize)]
struct MessageResponse {
    id: String,
    #[serde(default)]
    payload: Option<Payload>,
}

#[derive(Deserialize)]
struct Payload {
    #[serde(default)]
    headers: Vec<Header>,
}

#[derive(Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Gmail API client for the authenticated user (`me`).
#[derive(Debug, Clone)]
pub struct GmailClient {
    client: Client,
    base_url: String,
}

impl GmailClient {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, GMAIL_API_BASE)
    }

    pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// List message references matching `query`, newest first.
    #[instrument(skip(self, access_token), fields(q = ?query.q, labels = ?query.label_ids))]
    pub async fn list_messages(
        &self,
        access_token: &str,
        query: &ListQuery,
    ) -> Result<Vec<MessageRef>, GmailError> {
        let mut params: Vec<(&str, String)> = vec![("maxResults", query.max_results.to_string())];
        if let Some(q) = query.q.as_ref() {
            params.push(("q", q.clone()));
        }
        for label in &query.label_ids {
            params.push(("labelIds", label.clone()));
        }

        let response = self
            .client
            .get(format!("{}/users/me/messages", self.base_url))
            .bearer_auth(access_token)
            .query(&params)
            .send()
            .await?;

        let body: ListResponse = decode(response).await?;
        debug!(count = body.messages.len(), "Listed messages");
        Ok(body.messages)
    }

    /// Fetch the From / Subject / Date headers of one message.
    #[instrument(skip(self, access_token))]
    pub async fn get_metadata(
        &self,
        access_token: &str,
        id: &str,
    ) -> Result<MessageMetadata, GmailError> {
        let mut params = vec![("format", "metadata")];
        params.extend(METADATA_HEADERS.iter().map(|h| ("metadataHeaders", *h)));

        let response = self
            .client
            .get(format!("{}/users/me/messages/{}", self.base_url, id))
            .bearer_auth(access_token)
            .query(&params)
            .send()
            .await?;

        let body: MessageResponse = decode(response).await?;
        let headers = body.payload.map(|p| p.headers).unwrap_or_default();
        let find = |name: &str| {
            headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case(name))
                .map(|h| h.value.clone())
        };

        Ok(MessageMetadata {
            from: find("From"),
            subject: find("Subject"),
            date: find("Date"),
            id: body.id,
        })
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GmailError> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<ApiErrorBody>(&text)
            .map(|body| body.error.message)
            .unwrap_or(text);
        return Err(GmailError::Api {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&text).map_err(|e| GmailError::Parse(e.to_string()))
}
