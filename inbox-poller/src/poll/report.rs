use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::action::ActionOutput;
use crate::credentials::AuthContext;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("{0}")]
    Failed(String),
}

/// Records the output of a successful action.
#[async_trait]
pub trait CycleReporter: Send + Sync {
    async fn report(
        &self,
        context: &AuthContext,
        strategy: &str,
        output: &ActionOutput,
    ) -> Result<(), ReportError>;
}

/// Logs the output without further calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

#[async_trait]
impl CycleReporter for LogReporter {
    async fn report(
        &self,
        _context: &AuthContext,
        strategy: &str,
        output: &ActionOutput,
    ) -> Result<(), ReportError> {
        match output {
            ActionOutput::Triggered { locator } => info!(strategy, %locator, "Fetch triggered"),
            ActionOutput::Messages(messages) => {
                info!(strategy, count = messages.len(), "Found unread message(s)")
            }
        }
        Ok(())
    }
}
