//! Interval loop driving the poller.

use std::time::Duration;

use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::Poller;
use super::runner::CycleResult;

/// Runs one cycle per interval until cancelled or `max_cycles` is reached.
pub struct PollScheduler {
    interval: Duration,
    max_cycles: Option<u64>,
    cancel_token: CancellationToken,
}

impl PollScheduler {
    pub fn new(
        interval: Duration,
        max_cycles: Option<u64>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            interval,
            max_cycles,
            cancel_token,
        }
    }

    /// Drive `poller` and return the number of completed cycles.
    ///
    /// Cancellation is only observed between cycles.
    pub async fn run(&self, poller: &mut Poller) -> u64 {
        let mut completed = 0u64;

        loop {
            if self.cancel_token.is_cancelled() {
                debug!("Scheduler cancelled before next cycle");
                break;
            }

            let check = completed + 1;
            info!(
                check,
                at = %Local::now().format("%Y-%m-%d %H:%M:%S"),
                "--- Check #{} ---",
                check
            );

            let result = poller.tick().await;
            completed = check;
            self.log_result(check, &result, poller);

            if self.max_cycles.is_some_and(|max| completed >= max) {
                info!(cycles = completed, "Reached configured cycle limit");
                break;
            }

            debug!(interval = ?self.interval, "Waiting until next check");
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Shutdown requested, stopping poll loop");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        completed
    }

    fn log_result(&self, check: u64, result: &CycleResult, poller: &Poller) {
        let streak = poller.recovery().streak();
        match result {
            CycleResult::Success { strategy, output } => info!(
                check,
                strategy = %strategy,
                count = output.count(),
                "Check completed"
            ),
            CycleResult::AuthFailure { cause } => error!(
                check,
                streak,
                cause = %cause,
                "Check failed: authentication"
            ),
            other => warn!(
                check,
                streak,
                outcome = other.kind(),
                cause = %other.cause().unwrap_or_default(),
                "Check failed"
            ),
        }
    }
}
