//! One poll cycle: session check, action, report.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{error, instrument, warn};

use super::report::{CycleReporter, ReportError};
use crate::action::{self, ActionOutput, ActionStrategy, AttemptRecord, ResolveError};
use crate::credentials::AuthenticationSession;

/// Classified outcome of one cycle.
#[derive(Debug, Clone)]
pub enum CycleResult {
    Success {
        strategy: String,
        output: ActionOutput,
    },
    /// Every strategy was not applicable or failed.
    ActionNotFound { attempts: Vec<AttemptRecord> },
    TransientFailure { cause: String },
    AuthFailure { cause: String },
}

impl CycleResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Short outcome name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::ActionNotFound { .. } => "action_not_found",
            Self::TransientFailure { .. } => "transient_failure",
            Self::AuthFailure { .. } => "auth_failure",
        }
    }

    /// Human-readable failure cause, `None` on success.
    pub fn cause(&self) -> Option<String> {
        match self {
            Self::Success { .. } => None,
            Self::ActionNotFound { attempts } => Some(action::resolver::summarize(attempts)),
            Self::TransientFailure { cause } | Self::AuthFailure { cause } => Some(cause.clone()),
        }
    }
}

impl fmt::Display for CycleResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { strategy, output } => {
                write!(f, "success via {} ({} item(s))", strategy, output.count())
            }
            other => write!(
                f,
                "{}: {}",
                other.kind(),
                other.cause().unwrap_or_default()
            ),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Executes single cycles. Never fails and never panics past `run_once`.
pub struct PollCycleRunner {
    session: AuthenticationSession,
    strategies: Vec<Arc<dyn ActionStrategy>>,
    reporter: Arc<dyn CycleReporter>,
    attempt_timeout: Duration,
}

impl PollCycleRunner {
    pub fn new(
        session: AuthenticationSession,
        strategies: Vec<Arc<dyn ActionStrategy>>,
        reporter: Arc<dyn CycleReporter>,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            session,
            strategies,
            reporter,
            attempt_timeout,
        }
    }

    pub fn session(&self) -> &AuthenticationSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut AuthenticationSession {
        &mut self.session
    }

    pub fn strategy_ids(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.id()).collect()
    }

    /// Run one cycle. A panic anywhere in the cycle becomes a `TransientFailure`.
    #[instrument(skip(self))]
    pub async fn run_once(&mut self) -> CycleResult {
        match AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let cause = format!("cycle panicked: {}", panic_message(panic.as_ref()));
                error!(%cause, "Poll cycle panicked");
                CycleResult::TransientFailure { cause }
            }
        }
    }

    async fn run_cycle(&mut self) -> CycleResult {
        let context = match self.session.ensure_active().await {
            Ok(context) => context,
            Err(e) => {
                return CycleResult::AuthFailure {
                    cause: e.to_string(),
                };
            }
        };

        let resolution =
            match action::perform(&self.strategies, &context, self.attempt_timeout).await {
                Ok(resolution) => resolution,
                Err(ResolveError::NoStrategySucceeded { attempts }) => {
                    return CycleResult::ActionNotFound { attempts };
                }
                Err(e @ ResolveError::Unauthorized { .. }) => {
                    return CycleResult::AuthFailure {
                        cause: e.to_string(),
                    };
                }
            };

        let report_timeout = self.report_timeout(&resolution.output);
        let report = tokio::time::timeout(
            report_timeout,
            self.reporter
                .report(&context, &resolution.strategy, &resolution.output),
        )
        .await;

        match report {
            Ok(Ok(())) => CycleResult::Success {
                strategy: resolution.strategy,
                output: resolution.output,
            },
            Ok(Err(ReportError::Unauthorized(cause))) => CycleResult::AuthFailure { cause },
            Ok(Err(ReportError::Failed(cause))) => CycleResult::TransientFailure { cause },
            Err(_) => {
                warn!(timeout = ?report_timeout, "Reporting timed out");
                CycleResult::TransientFailure {
                    cause: format!("reporting timed out after {:?}", report_timeout),
                }
            }
        }
    }

    /// One attempt timeout for the report itself plus one per reported item.
    fn report_timeout(&self, output: &ActionOutput) -> Duration {
        let items = u32::try_from(output.count()).unwrap_or(u32::MAX);
        self.attempt_timeout.saturating_mul(items.saturating_add(1))
    }
}
