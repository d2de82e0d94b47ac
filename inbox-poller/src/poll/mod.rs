//! Poll loop.
//!
//! - [`PollCycleRunner`]: one cycle (ensure session, resolve action, report)
//! - [`RecoveryController`]: failure streak and session invalidation
//! - [`Poller`]: wires runner output into the controller
//! - [`PollScheduler`]: interval loop with cancellation

mod recovery;
mod report;
mod runner;
mod scheduler;

pub use recovery::{FailureStreak, RecoveryController, SessionInvalidator};
pub use report::{CycleReporter, LogReporter, ReportError};
pub use runner::{CycleResult, PollCycleRunner};
pub use scheduler::PollScheduler;

/// Owns the runner and the recovery controller.
pub struct Poller {
    runner: PollCycleRunner,
    recovery: RecoveryController,
}

impl Poller {
    pub fn new(runner: PollCycleRunner, recovery: RecoveryController) -> Self {
        Self { runner, recovery }
    }

    /// Run one cycle and feed its outcome to the recovery controller.
    pub async fn tick(&mut self) -> CycleResult {
        let result = self.runner.run_once().await;
        self.recovery.observe(&result, self.runner.session_mut());
        result
    }

    pub fn runner(&self) -> &PollCycleRunner {
        &self.runner
    }

    pub fn runner_mut(&mut self) -> &mut PollCycleRunner {
        &mut self.runner
    }

    pub fn recovery(&self) -> &RecoveryController {
        &self.recovery
    }
}
