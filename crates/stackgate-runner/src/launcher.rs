use std::time::Instant;

use thiserror::Error;
use tokio::task::JoinSet;

use stackgate_core::{now_ms, tail_lines, CheckOutcome, CheckResult, LayerSpec};
use stackgate_env::EnvMap;
use stackgate_probe::{run_probe, ProbeClient, OUTPUT_TAIL_LINES};

#[derive(Debug, Error)]
pub enum LaunchError {
    /// The start action itself failed. Carries the results recorded so far
    /// (the failed start check) so the runner can report them.
    #[error("layer '{layer}' start action failed")]
    Start { layer: String, results: Vec<CheckResult> },

    /// A required service never became healthy.
    #[error("layer '{layer}' service '{service}' never became healthy")]
    Unhealthy {
        layer: String,
        service: String,
        results: Vec<CheckResult>,
    },
}

impl LaunchError {
    /// The checks recorded before the launch gave up.
    pub fn into_results(self) -> Vec<CheckResult> {
        match self {
            LaunchError::Start { results, .. } => results,
            LaunchError::Unhealthy { results, .. } => results,
        }
    }
}

/// Start one layer: run its start action with the provisioned environment,
/// run per-service setup commands, then probe every service concurrently.
/// The layer is up only when all required probes pass; optional failures are
/// downgraded to warnings.
pub async fn start_layer(
    client: &ProbeClient,
    layer: &LayerSpec,
    env: &EnvMap,
    timeout_multiplier: f64,
) -> Result<Vec<CheckResult>, LaunchError> {
    let mut results = Vec::new();

    // Start action.
    let started = Instant::now();
    match crate::action::run_action(&layer.start, env).await {
        Ok(output) => {
            results.push(action_result(layer, "start", CheckOutcome::Passed, started, output));
        }
        Err(err) => {
            tracing::error!(layer = %layer.id, error = %err, "start action failed");
            results.push(action_result(layer, "start", CheckOutcome::Failed, started, err));
            return Err(LaunchError::Start { layer: layer.id.clone(), results });
        }
    }
    tracing::info!(layer = %layer.id, "layer started, probing services");

    // Per-service setup. Sequential: setup commands may depend on the start
    // action having settled but not on each other.
    let mut skip_probes: Vec<&str> = Vec::new();
    for service in &layer.services {
        let Some(setup) = &service.setup else { continue };
        let setup_started = Instant::now();
        match crate::action::run_action(setup, env).await {
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(layer = %layer.id, service = %service.id, error = %err, "setup failed");
                let result = CheckResult {
                    name: format!("{}:setup", service.id),
                    layer: layer.id.clone(),
                    kind: "setup".into(),
                    outcome: CheckOutcome::Failed,
                    required: service.required,
                    attempts: 1,
                    duration_ms: setup_started.elapsed().as_millis() as u64,
                    output: tail_lines(&err, OUTPUT_TAIL_LINES),
                    completed_at_ms: now_ms(),
                }
                .demoted_if_optional();
                results.push(result);
                if service.required {
                    return Err(LaunchError::Unhealthy {
                        layer: layer.id.clone(),
                        service: service.id.clone(),
                        results,
                    });
                }
                // No point probing a service whose setup failed.
                skip_probes.push(service.id.as_str());
            }
        }
    }

    // Probes for independent services run concurrently; results land in
    // completion order.
    let mut set = JoinSet::new();
    for service in &layer.services {
        if skip_probes.contains(&service.id.as_str()) {
            continue;
        }
        for probe in &service.probes {
            let client = client.clone();
            let spec = probe.scaled(timeout_multiplier);
            let layer_id = layer.id.clone();
            let service_id = service.id.clone();
            let required = service.required;
            set.spawn(async move {
                let mut result = run_probe(&client, &spec, &layer_id, required).await;
                result.name = format!("{service_id}:{}", result.name);
                (service_id, result)
            });
        }
    }

    let mut failed_required: Option<String> = None;
    while let Some(joined) = set.join_next().await {
        let Ok((service_id, result)) = joined else {
            continue;
        };
        if result.outcome == CheckOutcome::Failed && result.required {
            failed_required.get_or_insert(service_id);
        }
        results.push(result.demoted_if_optional());
    }

    if let Some(service) = failed_required {
        tracing::error!(layer = %layer.id, service = %service, "required service never became healthy");
        return Err(LaunchError::Unhealthy { layer: layer.id.clone(), service, results });
    }

    Ok(results)
}

/// Stop one layer with the environment it was started under. Best-effort:
/// teardown must run on top of a partially broken environment, so failures
/// are logged and swallowed.
pub async fn stop_layer(layer: &LayerSpec, env: &EnvMap) {
    match crate::action::run_action(&layer.stop, env).await {
        Ok(_) => tracing::info!(layer = %layer.id, "layer stopped"),
        Err(err) => tracing::warn!(layer = %layer.id, error = %err, "stop action failed"),
    }
}

fn action_result(
    layer: &LayerSpec,
    kind: &str,
    outcome: CheckOutcome,
    started: Instant,
    output: String,
) -> CheckResult {
    CheckResult {
        name: format!("{}:{kind}", layer.id),
        layer: layer.id.clone(),
        kind: kind.into(),
        outcome,
        required: layer.required_for_progress,
        attempts: 1,
        duration_ms: started.elapsed().as_millis() as u64,
        output: tail_lines(&output, OUTPUT_TAIL_LINES),
        completed_at_ms: now_ms(),
    }
}
