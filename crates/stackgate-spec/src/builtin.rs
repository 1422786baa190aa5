use stackgate_core::{ActionSpec, GateSpec, LayerSpec, ProbeSpec, ProbeTarget, ServiceSpec};

use crate::error::ConfigError;
use crate::load::validate_gate;

/// Resolve a built-in gate by name. Built-ins are self-contained: they touch
/// nothing outside the local machine.
pub fn builtin_gate(name: &str) -> Result<GateSpec, ConfigError> {
    let gate = match name {
        "loopback-smoke" => loopback_smoke(),
        other => return Err(ConfigError::UnknownBuiltin(other.to_string())),
    };
    validate_gate(&gate)?;
    Ok(gate)
}

pub fn builtin_names() -> &'static [&'static str] {
    &["loopback-smoke"]
}

/// Demo gate exercising the whole pipeline with no external services:
/// start/stop are no-ops and the probes are local exec checks.
fn loopback_smoke() -> GateSpec {
    GateSpec {
        gate: "loopback-smoke".into(),
        layers: vec![LayerSpec {
            id: "loopback".into(),
            required_for_progress: true,
            requires: vec![],
            env: vec![],
            start: noop(),
            stop: noop(),
            services: vec![ServiceSpec {
                id: "shell".into(),
                required: true,
                setup: None,
                probes: vec![ProbeSpec {
                    name: "shell-echo".into(),
                    target: ProbeTarget::Exec {
                        program: "sh".into(),
                        args: vec!["-c".into(), "echo ok".into()],
                        stdout_substring: Some("ok".into()),
                    },
                    max_attempts: 2,
                    retry_interval_ms: 100,
                    timeout_per_attempt_ms: 2_000,
                }],
            }],
        }],
    }
}

fn noop() -> ActionSpec {
    ActionSpec { program: "true".into(), args: vec![], cwd: None }
}
