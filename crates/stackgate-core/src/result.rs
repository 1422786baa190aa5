use serde::{Deserialize, Serialize};

/// Tagged outcome of one check. Replaces ad hoc boolean return codes: a
/// failed optional check is Warned, never Failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckOutcome {
    Passed,
    Warned,
    Failed,
}

/// Record of one probe or auxiliary validation. Immutable once recorded;
/// the ordered list of these is the sole input to the reporter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub layer: String,
    /// Check kind label: "tcp" | "http" | "exec" | "start" | "setup" | "skip".
    pub kind: String,
    pub outcome: CheckOutcome,
    pub required: bool,
    /// Attempts used before reaching a terminal state.
    pub attempts: u32,
    pub duration_ms: u64,
    /// Bounded excerpt of captured output (last lines only).
    pub output: String,
    pub completed_at_ms: i64,
}

impl CheckResult {
    pub fn passed(&self) -> bool {
        self.outcome == CheckOutcome::Passed
    }

    /// Downgrade a failure on an optional check to a warning.
    pub fn demoted_if_optional(mut self) -> Self {
        if !self.required && self.outcome == CheckOutcome::Failed {
            self.outcome = CheckOutcome::Warned;
        }
        self
    }
}

/// Aggregate status of a completed run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Success,
    SuccessWithWarnings,
    Failed,
}

impl RunStatus {
    pub fn exit_code(&self) -> i32 {
        match self {
            // Warnings are advisory, not blocking.
            RunStatus::Success | RunStatus::SuccessWithWarnings => 0,
            RunStatus::Failed => 1,
        }
    }
}

/// Compute the aggregate status from every recorded check:
/// any required Failed => Failed; else any Failed/Warned =>
/// SuccessWithWarnings; else Success.
pub fn aggregate_status(results: &[CheckResult]) -> RunStatus {
    let mut warned = false;
    for r in results {
        match r.outcome {
            CheckOutcome::Failed if r.required => return RunStatus::Failed,
            CheckOutcome::Failed | CheckOutcome::Warned => warned = true,
            CheckOutcome::Passed => {}
        }
    }
    if warned {
        RunStatus::SuccessWithWarnings
    } else {
        RunStatus::Success
    }
}
