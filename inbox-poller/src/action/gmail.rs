//! Gmail API strategy and reporter.

use std::time::Duration;

use async_trait::async_trait;
use mail_transport::gmail::{GmailClient, GmailError, ListQuery};
use tracing::{info, warn};

use super::strategy::{ActionOutput, ActionStrategy, StrategyError};
use crate::credentials::AuthContext;
use crate::poll::{CycleReporter, ReportError};

fn map_gmail_error(err: GmailError) -> StrategyError {
    if err.is_unauthorized() {
        StrategyError::Unauthorized(err.to_string())
    } else if err.is_not_applicable() {
        StrategyError::NotApplicable(err.to_string())
    } else {
        StrategyError::Failed(err.to_string())
    }
}

/// Lists unread messages with one fixed query shape.
pub struct GmailQueryStrategy {
    id: String,
    gmail: GmailClient,
    query: ListQuery,
}

impl GmailQueryStrategy {
    pub fn new(id: impl Into<String>, gmail: GmailClient, query: ListQuery) -> Self {
        Self {
            id: id.into(),
            gmail,
            query,
        }
    }

    /// `labelIds` filter: every configured label plus `UNREAD`.
    pub fn by_labels(
        id: impl Into<String>,
        gmail: GmailClient,
        labels: &[String],
        max: u32,
    ) -> Self {
        let mut label_ids: Vec<String> = labels.to_vec();
        if !label_ids.iter().any(|l| l == "UNREAD") {
            label_ids.push("UNREAD".to_string());
        }
        Self::new(
            id,
            gmail,
            ListQuery {
                q: None,
                label_ids,
                max_results: max,
            },
        )
    }

    /// Gmail search expression filter.
    pub fn by_search(
        id: impl Into<String>,
        gmail: GmailClient,
        q: impl Into<String>,
        max: u32,
    ) -> Self {
        Self::new(
            id,
            gmail,
            ListQuery {
                q: Some(q.into()),
                label_ids: Vec::new(),
                max_results: max,
            },
        )
    }

    pub fn query(&self) -> &ListQuery {
        &self.query
    }
}

#[async_trait]
impl ActionStrategy for GmailQueryStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, context: &AuthContext) -> Result<ActionOutput, StrategyError> {
        let messages = self
            .gmail
            .list_messages(context.token(), &self.query)
            .await
            .map_err(map_gmail_error)?;
        Ok(ActionOutput::Messages(messages))
    }
}

/// Logs From / Subject / Date of every listed message.
pub struct GmailReporter {
    gmail: GmailClient,
    /// Bound for each metadata fetch.
    fetch_timeout: Duration,
}

impl GmailReporter {
    pub fn new(gmail: GmailClient, fetch_timeout: Duration) -> Self {
        Self {
            gmail,
            fetch_timeout,
        }
    }
}

#[async_trait]
impl CycleReporter for GmailReporter {
    async fn report(
        &self,
        context: &AuthContext,
        strategy: &str,
        output: &ActionOutput,
    ) -> Result<(), ReportError> {
        let messages = match output {
            ActionOutput::Messages(messages) => messages,
            ActionOutput::Triggered { locator } => {
                info!(strategy, %locator, "Fetch triggered");
                return Ok(());
            }
        };

        if messages.is_empty() {
            info!(strategy, "No new unread messages found");
            return Ok(());
        }
        info!(strategy, count = messages.len(), "Found unread message(s)");

        for message in messages {
            let fetch = tokio::time::timeout(
                self.fetch_timeout,
                self.gmail.get_metadata(context.token(), &message.id),
            )
            .await;

            let Ok(fetch) = fetch else {
                warn!(
                    id = %message.id,
                    timeout = ?self.fetch_timeout,
                    "Message metadata fetch timed out"
                );
                continue;
            };

            match fetch {
                Ok(meta) => info!(
                    id = %meta.id,
                    from = meta.from.as_deref().unwrap_or("Unknown"),
                    subject = meta.subject.as_deref().unwrap_or("No Subject"),
                    date = meta.date.as_deref().unwrap_or("Unknown"),
                    "Message"
                ),
                Err(e) if e.is_unauthorized() => {
                    return Err(ReportError::Unauthorized(e.to_string()));
                }
                Err(e) => warn!(id = %message.id, error = %e, "Failed to fetch message metadata"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::{Path, RawQuery};
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    use super::*;
    use crate::test_utils::{spawn_server, test_client};

    async fn list(RawQuery(query): RawQuery) -> (StatusCode, Json<Value>) {
        let query = query.unwrap_or_default();
        if query.contains("labelIds=Custom") {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": {"message": "Invalid label: Custom"}})),
            );
        }
        if query.contains("q=revoked") {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": {"message": "Invalid Credentials"}})),
            );
        }
        if query.contains("q=broken") {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": {"message": "backend"}})),
            );
        }
        (
            StatusCode::OK,
            Json(json!({"messages": [{"id": "m1", "threadId": "t1"}, {"id": "gone", "threadId": "t2"}]})),
        )
    }

    async fn message(Path(id): Path<String>) -> (StatusCode, Json<Value>) {
        match id.as_str() {
            "m1" => (
                StatusCode::OK,
                Json(json!({"id": "m1", "payload": {"headers": [{"name": "Subject", "value": "Hi"}]}})),
            ),
            "slow" => {
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                (StatusCode::OK, Json(json!({"id": "slow"})))
            }
            "revoked" => (
                StatusCode::FORBIDDEN,
                Json(json!({"error": {"message": "Insufficient Permission"}})),
            ),
            _ => (
                StatusCode::NOT_FOUND,
                Json(json!({"error": {"message": "Not Found"}})),
            ),
        }
    }

    async fn gmail() -> GmailClient {
        let app = Router::new()
            .route("/users/me/messages", get(list))
            .route("/users/me/messages/{id}", get(message));
        GmailClient::with_base_url(test_client(), spawn_server(app).await)
    }

    #[tokio::test]
    async fn test_labels_strategy_adds_unread() {
        let strategy =
            GmailQueryStrategy::by_labels("labels", gmail().await, &["INBOX".into()], 10);
        assert_eq!(strategy.query().label_ids, vec!["INBOX", "UNREAD"]);

        let output = strategy.execute(&AuthContext::new("t")).await.unwrap();
        assert_eq!(output.count(), 2);
    }

    #[tokio::test]
    async fn test_status_codes_are_classified() {
        let gmail = gmail().await;
        let ctx = AuthContext::new("t");

        let unknown_label =
            GmailQueryStrategy::by_labels("labels", gmail.clone(), &["Custom".into()], 10);
        assert!(matches!(
            unknown_label.execute(&ctx).await,
            Err(StrategyError::NotApplicable(_))
        ));

        let revoked = GmailQueryStrategy::by_search("query:revoked", gmail.clone(), "revoked", 10);
        assert!(matches!(
            revoked.execute(&ctx).await,
            Err(StrategyError::Unauthorized(_))
        ));

        let broken = GmailQueryStrategy::by_search("query:broken", gmail, "broken", 10);
        assert!(matches!(broken.execute(&ctx).await, Err(StrategyError::Failed(_))));
    }

    #[tokio::test]
    async fn test_reporter_tolerates_missing_message() {
        let reporter = GmailReporter::new(gmail().await, Duration::from_secs(1));
        let output = ActionOutput::Messages(vec![
            mail_transport::gmail::MessageRef {
                id: "m1".into(),
                thread_id: "t1".into(),
            },
            mail_transport::gmail::MessageRef {
                id: "gone".into(),
                thread_id: "t2".into(),
            },
        ]);

        reporter
            .report(&AuthContext::new("t"), "labels", &output)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reporter_unauthorized_is_surfaced() {
        let reporter = GmailReporter::new(gmail().await, Duration::from_secs(1));
        let output = ActionOutput::Messages(vec![mail_transport::gmail::MessageRef {
            id: "revoked".into(),
            thread_id: "t".into(),
        }]);

        let err = reporter
            .report(&AuthContext::new("t"), "labels", &output)
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_reporter_bounds_each_fetch() {
        let reporter = GmailReporter::new(gmail().await, Duration::from_millis(100));
        let output = ActionOutput::Messages(vec![
            mail_transport::gmail::MessageRef {
                id: "slow".into(),
                thread_id: "t1".into(),
            },
            mail_transport::gmail::MessageRef {
                id: "m1".into(),
                thread_id: "t2".into(),
            },
        ]);

        let started = std::time::Instant::now();
        reporter
            .report(&AuthContext::new("t"), "labels", &output)
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
