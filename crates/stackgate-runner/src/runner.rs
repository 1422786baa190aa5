use std::collections::{BTreeMap, HashSet};
use std::future::Future;

use thiserror::Error;

use stackgate_core::{
    now_ms, CheckOutcome, CheckResult, GatePhase, GateSpec, LayerSpec, RunId, RunState, RunStatus,
};
use stackgate_env::{EnvMap, Provisioner, ProvisionError};
use stackgate_probe::ProbeClient;

use crate::cleanup::CleanupManager;
use crate::launcher::start_layer;

#[derive(Clone, Debug)]
pub struct RunOptions {
    /// Leave the stack running after a successful gate.
    pub skip_cleanup: bool,
    /// Scales every probe's retry interval and per-attempt timeout.
    pub timeout_multiplier: f64,
    /// Restrict the run to a single layer id.
    pub only_layer: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            skip_cleanup: false,
            timeout_multiplier: 1.0,
            only_layer: None,
        }
    }
}

/// Errors that abort a run before any service is started.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error("--only-layer: gate has no layer '{0}'")]
    UnknownLayer(String),
}

/// How the run ended. Aborted and Interrupted are distinct from an ordinary
/// completed-with-failures run: Aborted names the layer that stopped the
/// sequence, Interrupted maps to exit code 130.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Termination {
    Completed(RunStatus),
    Aborted { layer: String, reason: String },
    Interrupted,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub gate: String,
    pub termination: Termination,
    pub results: Vec<CheckResult>,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match &self.termination {
            Termination::Completed(status) => status.exit_code(),
            Termination::Aborted { .. } => 1,
            Termination::Interrupted => 130,
        }
    }
}

/// Drives one gate invocation: layers strictly serially, probes within a
/// layer concurrently, cleanup guaranteed.
pub struct GateRunner {
    gate: GateSpec,
    options: RunOptions,
    client: ProbeClient,
}

impl GateRunner {
    pub fn new(gate: GateSpec, options: RunOptions) -> Self {
        Self {
            gate,
            options,
            client: ProbeClient::new(),
        }
    }

    /// Run the gate, tearing down on ctrl-c.
    pub async fn run(self, provisioner: &mut Provisioner) -> Result<RunOutcome, RunError> {
        self.run_with_shutdown(provisioner, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
    }

    /// Run the gate, treating completion of `shutdown` as an external
    /// interrupt: stop issuing work, tear down synchronously, report
    /// Interrupted.
    pub async fn run_with_shutdown(
        self,
        provisioner: &mut Provisioner,
        shutdown: impl Future<Output = ()>,
    ) -> Result<RunOutcome, RunError> {
        let run_id = RunId::new();
        tracing::info!(gate = %self.gate.gate, run_id = %run_id.as_str(), "gate run starting");

        let layers = self.select_layers()?;

        // Provision every layer up front: a missing variable in layer N must
        // surface before layer 1 launches anything.
        let mut envs: BTreeMap<String, EnvMap> = BTreeMap::new();
        for layer in &layers {
            envs.insert(layer.id.clone(), provisioner.provision(layer)?);
        }

        let mut state = RunState::new();
        let mut cleanup = CleanupManager::new();
        let mut phase = GatePhase::Pending;
        let mut unavailable: HashSet<String> = HashSet::new();
        let mut interrupted = false;
        let mut abort: Option<(usize, String)> = None;

        tokio::pin!(shutdown);

        for (idx, layer) in layers.iter().enumerate() {
            transition(&mut phase, GatePhase::LayerStarting(idx));

            // A layer depending on a failed-optional (or skipped) layer is
            // skipped rather than started against a missing dependency.
            if let Some(dep) = layer.requires.iter().find(|d| unavailable.contains(d.as_str())) {
                tracing::warn!(layer = %layer.id, dependency = %dep, "skipping layer, dependency unavailable");
                state.record(skip_result(layer, dep));
                unavailable.insert(layer.id.clone());
                state.advance_layer();
                continue;
            }

            let env = envs.get(&layer.id).cloned().unwrap_or_default();
            state.mark_started(&layer.id);
            cleanup.register(layer, env.clone());

            let outcome = tokio::select! {
                res = start_layer(&self.client, layer, &env, self.options.timeout_multiplier) => Some(res),
                _ = &mut shutdown => None,
            };

            match outcome {
                None => {
                    tracing::warn!(layer = %layer.id, "interrupted, tearing down");
                    interrupted = true;
                    break;
                }
                Some(Ok(results)) => {
                    state.record_all(results);
                    state.mark_healthy(&layer.id);
                    transition(&mut phase, GatePhase::LayerHealthy(idx));
                    state.advance_layer();
                }
                Some(Err(err)) if layer.required_for_progress => {
                    let reason = err.to_string();
                    state.record_all(err.into_results());
                    abort = Some((idx, reason));
                    break;
                }
                Some(Err(err)) => {
                    tracing::warn!(layer = %layer.id, error = %err, "optional layer failed, continuing");
                    state.record_all(err.into_results().into_iter().map(demote));
                    unavailable.insert(layer.id.clone());
                    state.advance_layer();
                }
            }
        }

        if interrupted {
            cleanup.cleanup_all().await;
            return Ok(RunOutcome {
                run_id,
                gate: self.gate.gate,
                termination: Termination::Interrupted,
                results: state.into_results(),
            });
        }

        if let Some((idx, reason)) = abort {
            transition(&mut phase, GatePhase::Aborted { layer: idx, reason: reason.clone() });
            cleanup.cleanup_all().await;
            return Ok(RunOutcome {
                run_id,
                gate: self.gate.gate,
                termination: Termination::Aborted { layer: layers[idx].id.clone(), reason },
                results: state.into_results(),
            });
        }

        let status = state.status();
        transition(&mut phase, GatePhase::Completed(status));
        if self.options.skip_cleanup {
            tracing::info!("cleanup skipped, stack left running");
        } else {
            cleanup.cleanup_all().await;
        }

        Ok(RunOutcome {
            run_id,
            gate: self.gate.gate,
            termination: Termination::Completed(status),
            results: state.into_results(),
        })
    }

    fn select_layers(&self) -> Result<Vec<LayerSpec>, RunError> {
        match &self.options.only_layer {
            None => Ok(self.gate.layers.clone()),
            Some(id) => self
                .gate
                .layers
                .iter()
                .find(|l| &l.id == id)
                .cloned()
                .map(|l| vec![l])
                .ok_or_else(|| RunError::UnknownLayer(id.clone())),
        }
    }
}

fn transition(phase: &mut GatePhase, next: GatePhase) {
    tracing::debug!(from = ?phase, to = ?next, "phase transition");
    *phase = next;
}

/// A failed result inside an optional layer is advisory, never fatal.
fn demote(mut result: CheckResult) -> CheckResult {
    if result.outcome == CheckOutcome::Failed {
        result.outcome = CheckOutcome::Warned;
    }
    result
}

fn skip_result(layer: &LayerSpec, missing_dep: &str) -> CheckResult {
    CheckResult {
        name: format!("{}:skipped", layer.id),
        layer: layer.id.clone(),
        kind: "skip".into(),
        outcome: CheckOutcome::Warned,
        required: false,
        attempts: 0,
        duration_ms: 0,
        output: format!("skipped: required dependency '{missing_dep}' unavailable"),
        completed_at_ms: now_ms(),
    }
}
