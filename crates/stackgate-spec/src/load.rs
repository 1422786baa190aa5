use std::collections::HashSet;
use std::path::Path;

use stackgate_core::GateSpec;

use crate::error::ConfigError;

/// Load a gate definition from a YAML file and validate it.
pub fn load_gate(path: &Path) -> Result<GateSpec, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let gate: GateSpec = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    validate_gate(&gate)?;
    Ok(gate)
}

/// Structural validation, run before anything is launched.
pub fn validate_gate(gate: &GateSpec) -> Result<(), ConfigError> {
    if gate.gate.trim().is_empty() {
        return Err(ConfigError::Invalid("gate name is empty".into()));
    }
    if gate.layers.is_empty() {
        return Err(ConfigError::Invalid("gate has no layers".into()));
    }

    let mut layer_ids = HashSet::new();
    let mut earlier: HashSet<&str> = HashSet::new();

    for layer in &gate.layers {
        if layer.id.trim().is_empty() {
            return Err(ConfigError::Invalid("layer with empty id".into()));
        }
        if !layer_ids.insert(layer.id.as_str()) {
            return Err(ConfigError::Invalid(format!("duplicate layer id '{}'", layer.id)));
        }
        for dep in &layer.requires {
            // requires may only reference layers declared earlier, matching
            // the strictly serial start order.
            if !earlier.contains(dep.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "layer '{}' requires '{}', which is not an earlier layer",
                    layer.id, dep
                )));
            }
        }
        if layer.services.is_empty() {
            return Err(ConfigError::Invalid(format!("layer '{}' has no services", layer.id)));
        }

        let mut service_ids = HashSet::new();
        for service in &layer.services {
            if !service_ids.insert(service.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate service id '{}' in layer '{}'",
                    service.id, layer.id
                )));
            }
            if service.probes.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "service '{}/{}' has no probes",
                    layer.id, service.id
                )));
            }
            for probe in &service.probes {
                if probe.max_attempts == 0 {
                    return Err(ConfigError::Invalid(format!(
                        "probe '{}' in '{}/{}' has max_attempts 0",
                        probe.name, layer.id, service.id
                    )));
                }
                if probe.timeout_per_attempt_ms == 0 {
                    return Err(ConfigError::Invalid(format!(
                        "probe '{}' in '{}/{}' has timeout_per_attempt_ms 0",
                        probe.name, layer.id, service.id
                    )));
                }
            }
        }

        earlier.insert(layer.id.as_str());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const GOOD_GATE: &str = r#"
gate: core-infra
layers:
  - id: datastores
    env:
      - name: PG_PASSWORD
        source: secret
      - name: PG_USER
        source: static
        value: gate
    start: { program: "docker", args: ["compose", "up", "-d", "postgres"] }
    stop: { program: "docker", args: ["compose", "down", "postgres"] }
    services:
      - id: postgres
        probes:
          - name: pg-port
            kind: tcp
            host: 127.0.0.1
            port: 5432
            max_attempts: 5
            retry_interval_ms: 1000
            timeout_per_attempt_ms: 2000
  - id: apps
    requires: [datastores]
    required_for_progress: false
    start: { program: "docker", args: ["compose", "up", "-d", "api"] }
    stop: { program: "docker", args: ["compose", "down", "api"] }
    services:
      - id: api
        required: false
        probes:
          - name: api-health
            kind: http
            url: "http://127.0.0.1:8080/health"
            expect_status: 200
            body_substring: ok
"#;

    #[test]
    fn loads_and_validates_yaml() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(GOOD_GATE.as_bytes()).unwrap();
        let gate = load_gate(f.path()).unwrap();
        assert_eq!(gate.gate, "core-infra");
        assert_eq!(gate.layers.len(), 2);
        assert_eq!(gate.layers[1].requires, vec!["datastores".to_string()]);
        assert!(!gate.layers[1].required_for_progress);
        // Defaults applied where the YAML is silent.
        let probe = &gate.layers[1].services[0].probes[0];
        assert_eq!(probe.max_attempts, 3);
        assert_eq!(probe.retry_interval_ms, 2_000);
    }

    #[test]
    fn rejects_forward_requires() {
        let mut gate = serde_yaml::from_str::<stackgate_core::GateSpec>(GOOD_GATE).unwrap();
        gate.layers[0].requires = vec!["apps".into()];
        let err = validate_gate(&gate).unwrap_err();
        assert!(err.to_string().contains("not an earlier layer"));
    }

    #[test]
    fn rejects_duplicate_layer_ids() {
        let mut gate = serde_yaml::from_str::<stackgate_core::GateSpec>(GOOD_GATE).unwrap();
        gate.layers[1].id = "datastores".into();
        gate.layers[1].requires.clear();
        let err = validate_gate(&gate).unwrap_err();
        assert!(err.to_string().contains("duplicate layer id"));
    }

    #[test]
    fn rejects_zero_attempt_probe() {
        let mut gate = serde_yaml::from_str::<stackgate_core::GateSpec>(GOOD_GATE).unwrap();
        gate.layers[0].services[0].probes[0].max_attempts = 0;
        let err = validate_gate(&gate).unwrap_err();
        assert!(err.to_string().contains("max_attempts 0"));
    }

    #[test]
    fn rejects_service_without_probes() {
        let mut gate = serde_yaml::from_str::<stackgate_core::GateSpec>(GOOD_GATE).unwrap();
        gate.layers[0].services[0].probes.clear();
        let err = validate_gate(&gate).unwrap_err();
        assert!(err.to_string().contains("has no probes"));
    }

    #[test]
    fn sample_gate_definition_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../gates/dev-stack.yaml");
        let gate = load_gate(&path).unwrap();
        assert_eq!(gate.gate, "dev-stack");
        assert_eq!(gate.layers.len(), 3);
        assert!(!gate.layers[1].required_for_progress);
    }

    #[test]
    fn read_error_names_path() {
        let err = load_gate(Path::new("/nonexistent/gate.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
