use serde::{Deserialize, Serialize};

use crate::result::{aggregate_status, CheckResult, RunStatus};

/// Gate runner state machine. The runner advances to `LayerStarting(i + 1)`
/// only from `LayerHealthy(i)`; a required failure goes straight to
/// `Aborted`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatePhase {
    Pending,
    LayerStarting(usize),
    LayerHealthy(usize),
    Completed(RunStatus),
    Aborted { layer: usize, reason: String },
}

impl GatePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, GatePhase::Completed(_) | GatePhase::Aborted { .. })
    }
}

/// Per-run mutable state, owned exclusively by the gate runner for one
/// invocation and discarded at exit. Probe tasks return results; they never
/// touch this directly.
#[derive(Debug, Default)]
pub struct RunState {
    started: Vec<String>,
    healthy: Vec<String>,
    results: Vec<CheckResult>,
    current_layer: usize,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_started(&mut self, layer_id: &str) {
        self.started.push(layer_id.to_string());
    }

    pub fn mark_healthy(&mut self, layer_id: &str) {
        self.healthy.push(layer_id.to_string());
    }

    pub fn advance_layer(&mut self) {
        self.current_layer += 1;
    }

    pub fn record(&mut self, result: CheckResult) {
        self.results.push(result);
    }

    pub fn record_all(&mut self, results: impl IntoIterator<Item = CheckResult>) {
        self.results.extend(results);
    }

    pub fn current_layer(&self) -> usize {
        self.current_layer
    }

    /// Layers started so far, in start order.
    pub fn started(&self) -> &[String] {
        &self.started
    }

    pub fn is_healthy(&self, layer_id: &str) -> bool {
        self.healthy.iter().any(|l| l == layer_id)
    }

    pub fn results(&self) -> &[CheckResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<CheckResult> {
        self.results
    }

    pub fn status(&self) -> RunStatus {
        aggregate_status(&self.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::CheckOutcome;

    #[test]
    fn terminal_phases() {
        assert!(!GatePhase::Pending.is_terminal());
        assert!(!GatePhase::LayerStarting(0).is_terminal());
        assert!(!GatePhase::LayerHealthy(2).is_terminal());
        assert!(GatePhase::Completed(RunStatus::Success).is_terminal());
        assert!(GatePhase::Aborted { layer: 1, reason: "db never healthy".into() }.is_terminal());
    }

    #[test]
    fn run_state_tracks_start_order() {
        let mut state = RunState::new();
        state.mark_started("datastores");
        state.mark_started("observability");
        state.mark_healthy("datastores");
        assert_eq!(state.started(), ["datastores", "observability"]);
        assert!(state.is_healthy("datastores"));
        assert!(!state.is_healthy("observability"));
    }

    #[test]
    fn run_state_status_reflects_results() {
        let mut state = RunState::new();
        assert_eq!(state.status(), RunStatus::Success);
        state.record(CheckResult {
            name: "redis:tcp".into(),
            layer: "datastores".into(),
            kind: "tcp".into(),
            outcome: CheckOutcome::Warned,
            required: false,
            attempts: 3,
            duration_ms: 40,
            output: String::new(),
            completed_at_ms: 0,
        });
        assert_eq!(state.status(), RunStatus::SuccessWithWarnings);
    }
}
