//! Consecutive-failure tracking and session recovery.
//!
//! Every cycle outcome is observed:
//! - `Success` resets the streak
//! - `AuthFailure` extends it and invalidates the session for the next cycle
//! - `TransientFailure` / `ActionNotFound` extend it without touching the session
//!
//! Reaching the threshold escalates logging only; the loop keeps running.

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use super::runner::CycleResult;
use crate::credentials::AuthenticationSession;

/// Something whose authenticated state can be forced stale.
pub trait SessionInvalidator {
    fn invalidate(&mut self, reason: &str);
}

impl SessionInvalidator for AuthenticationSession {
    fn invalidate(&mut self, reason: &str) {
        AuthenticationSession::invalidate(self, reason);
    }
}

/// Consecutive non-success cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureStreak {
    pub count: u32,
    pub first_failure: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_cause: Option<String>,
}

impl FailureStreak {
    fn record(&mut self, cause: String) -> u32 {
        let now = Utc::now();
        self.count = self.count.saturating_add(1);
        self.first_failure.get_or_insert(now);
        self.last_failure = Some(now);
        self.last_cause = Some(cause);
        self.count
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

pub struct RecoveryController {
    threshold: u32,
    streak: FailureStreak,
    escalated: bool,
}

impl RecoveryController {
    /// `threshold` is clamped to at least 1.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            streak: FailureStreak::default(),
            escalated: false,
        }
    }

    pub fn observe<S: SessionInvalidator + ?Sized>(&mut self, result: &CycleResult, session: &mut S) {
        let cause = match result {
            CycleResult::Success { .. } => {
                if self.escalated {
                    info!(
                        failures = self.streak.count,
                        since = ?self.streak.first_failure,
                        "Recovered after consecutive failures"
                    );
                }
                self.streak.reset();
                self.escalated = false;
                return;
            }
            CycleResult::AuthFailure { cause } => {
                session.invalidate(cause);
                cause.clone()
            }
            other => other.cause().unwrap_or_default(),
        };

        let count = self.streak.record(cause);

        if count >= self.threshold {
            if self.escalated {
                warn!(
                    failures = count,
                    last_error = ?self.streak.last_cause,
                    "Still failing"
                );
            } else {
                self.escalated = true;
                error!(
                    failures = count,
                    threshold = self.threshold,
                    last_error = ?self.streak.last_cause,
                    "Consecutive failure threshold reached"
                );
            }
        }
    }

    pub fn should_escalate(&self) -> bool {
        self.streak.count >= self.threshold
    }

    pub fn streak(&self) -> u32 {
        self.streak.count
    }

    pub fn failure_info(&self) -> Option<&FailureStreak> {
        (self.streak.count > 0).then_some(&self.streak)
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}
