use async_trait::async_trait;
use mail_transport::gmail::MessageRef;
use thiserror::Error;

use crate::credentials::AuthContext;

/// Failure of a single strategy attempt.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// The target is absent for this strategy. Expected; try the next one.
    #[error("not applicable: {0}")]
    NotApplicable(String),

    /// Unexpected fault while executing the strategy.
    #[error("{0}")]
    Failed(String),

    /// The credential was refused. No other strategy can succeed with it.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

/// Value produced by a successful strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutput {
    /// Messages matched by an API query.
    Messages(Vec<MessageRef>),
    /// A UI control was clicked.
    Triggered { locator: String },
}

impl ActionOutput {
    /// Number of messages, or 1 for a trigger.
    pub fn count(&self) -> usize {
        match self {
            Self::Messages(messages) => messages.len(),
            Self::Triggered { .. } => 1,
        }
    }
}

/// One candidate way of performing the poll action.
#[async_trait]
pub trait ActionStrategy: Send + Sync {
    /// Identifier used in logs and attempt records.
    fn id(&self) -> &str;

    async fn execute(&self, context: &AuthContext) -> Result<ActionOutput, StrategyError>;
}
