//! Ordered strategy resolution.
//!
//! Strategies are tried in order until one succeeds. Each attempt is bounded
//! by the attempt timeout and classified:
//! - `Succeeded`: stop, remaining strategies are `NotAttempted`
//! - `NotApplicable` / `Error` / `TimedOut`: move on
//! - `Unauthorized`: stop immediately, the credential must be replaced first

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::strategy::{ActionOutput, ActionStrategy, StrategyError};
use crate::credentials::AuthContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    NotApplicable(String),
    Error(String),
    TimedOut(Duration),
    NotAttempted,
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => f.write_str("succeeded"),
            Self::NotApplicable(reason) => write!(f, "not applicable ({})", reason),
            Self::Error(reason) => write!(f, "error ({})", reason),
            Self::TimedOut(after) => write!(f, "timed out after {:?}", after),
            Self::NotAttempted => f.write_str("not attempted"),
        }
    }
}

/// Diagnostic record of one strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub strategy: String,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
}

impl fmt::Display for AttemptRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.outcome)
    }
}

/// Successful resolution.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub strategy: String,
    pub output: ActionOutput,
    pub attempts: Vec<AttemptRecord>,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no strategy succeeded ({})", summarize(.attempts))]
    NoStrategySucceeded { attempts: Vec<AttemptRecord> },

    #[error("strategy {strategy} was unauthorized: {reason}")]
    Unauthorized {
        strategy: String,
        reason: String,
        attempts: Vec<AttemptRecord>,
    },
}

impl ResolveError {
    pub fn attempts(&self) -> &[AttemptRecord] {
        match self {
            Self::NoStrategySucceeded { attempts } | Self::Unauthorized { attempts, .. } => attempts,
        }
    }
}

/// Render attempt records as `a: outcome; b: outcome`.
pub fn summarize(attempts: &[AttemptRecord]) -> String {
    if attempts.is_empty() {
        return "no strategies configured".to_string();
    }
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn not_attempted(rest: &[Arc<dyn ActionStrategy>]) -> impl Iterator<Item = AttemptRecord> + '_ {
    rest.iter().map(|s| AttemptRecord {
        strategy: s.id().to_string(),
        outcome: AttemptOutcome::NotAttempted,
        elapsed: Duration::ZERO,
    })
}

/// Try `strategies` in order and return the first success.
#[instrument(skip_all, fields(strategies = strategies.len()))]
pub async fn perform(
    strategies: &[Arc<dyn ActionStrategy>],
    context: &AuthContext,
    attempt_timeout: Duration,
) -> Result<Resolution, ResolveError> {
    let mut attempts = Vec::with_capacity(strategies.len());

    for (index, strategy) in strategies.iter().enumerate() {
        let id = strategy.id().to_string();
        let started = Instant::now();
        let result = tokio::time::timeout(attempt_timeout, strategy.execute(context)).await;
        let elapsed = started.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;

        let outcome = match result {
            Ok(Ok(output)) => {
                info!(strategy = %id, elapsed_ms, count = output.count(), "Strategy succeeded");
                attempts.push(AttemptRecord {
                    strategy: id.clone(),
                    outcome: AttemptOutcome::Succeeded,
                    elapsed,
                });
                attempts.extend(not_attempted(&strategies[index + 1..]));
                return Ok(Resolution {
                    strategy: id,
                    output,
                    attempts,
                });
            }
            Ok(Err(StrategyError::Unauthorized(reason))) => {
                warn!(strategy = %id, elapsed_ms, %reason, "Strategy unauthorized, aborting resolution");
                attempts.push(AttemptRecord {
                    strategy: id.clone(),
                    outcome: AttemptOutcome::Error(format!("unauthorized: {}", reason)),
                    elapsed,
                });
                attempts.extend(not_attempted(&strategies[index + 1..]));
                return Err(ResolveError::Unauthorized {
                    strategy: id,
                    reason,
                    attempts,
                });
            }
            Ok(Err(StrategyError::NotApplicable(reason))) => {
                debug!(strategy = %id, elapsed_ms, %reason, "Strategy not applicable");
                AttemptOutcome::NotApplicable(reason)
            }
            Ok(Err(StrategyError::Failed(reason))) => {
                warn!(strategy = %id, elapsed_ms, %reason, "Strategy failed");
                AttemptOutcome::Error(reason)
            }
            Err(_) => {
                warn!(strategy = %id, elapsed_ms, timeout = ?attempt_timeout, "Strategy timed out");
                AttemptOutcome::TimedOut(attempt_timeout)
            }
        };

        attempts.push(AttemptRecord {
            strategy: id,
            outcome,
            elapsed,
        });
    }

    Err(ResolveError::NoStrategySucceeded { attempts })
}
