use stackgate_core::LayerSpec;
use stackgate_env::EnvMap;

/// Guarantees teardown of every started layer, in reverse start order, on
/// normal completion, required-failure abort, and interrupt. Reentrant:
/// the second call is a no-op.
pub struct CleanupManager {
    started: Vec<(LayerSpec, EnvMap)>,
    done: bool,
}

impl CleanupManager {
    pub fn new() -> Self {
        Self { started: Vec::new(), done: false }
    }

    /// Register a layer whose start action has been invoked, with the
    /// environment it was started under so the stop action sees the same
    /// values. Registered layers get a stop attempt even if their start
    /// only half-succeeded.
    pub fn register(&mut self, layer: &LayerSpec, env: EnvMap) {
        self.started.push((layer.clone(), env));
    }

    pub fn registered(&self) -> impl Iterator<Item = &str> {
        self.started.iter().map(|(l, _)| l.id.as_str())
    }

    /// Stop every registered layer, last started first. Returns the ids
    /// stopped in teardown order; an empty list on reentry.
    pub async fn cleanup_all(&mut self) -> Vec<String> {
        if self.done {
            tracing::debug!("cleanup already ran, skipping");
            return Vec::new();
        }
        self.done = true;

        let mut stopped = Vec::new();
        for (layer, env) in self.started.iter().rev() {
            crate::launcher::stop_layer(layer, env).await;
            stopped.push(layer.id.clone());
        }
        stopped
    }
}

impl Default for CleanupManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackgate_core::{ActionSpec, ProbeSpec, ProbeTarget, ServiceSpec};

    fn noop_layer(id: &str) -> LayerSpec {
        LayerSpec {
            id: id.into(),
            required_for_progress: true,
            requires: vec![],
            env: vec![],
            start: ActionSpec { program: "true".into(), args: vec![], cwd: None },
            stop: ActionSpec { program: "true".into(), args: vec![], cwd: None },
            services: vec![ServiceSpec {
                id: "svc".into(),
                required: true,
                setup: None,
                probes: vec![ProbeSpec {
                    name: "p".into(),
                    target: ProbeTarget::Exec { program: "true".into(), args: vec![], stdout_substring: None },
                    max_attempts: 1,
                    retry_interval_ms: 0,
                    timeout_per_attempt_ms: 1_000,
                }],
            }],
        }
    }

    #[tokio::test]
    async fn teardown_runs_in_reverse_start_order() {
        let mut mgr = CleanupManager::new();
        mgr.register(&noop_layer("datastores"), EnvMap::new());
        mgr.register(&noop_layer("observability"), EnvMap::new());
        mgr.register(&noop_layer("apps"), EnvMap::new());
        let stopped = mgr.cleanup_all().await;
        assert_eq!(stopped, ["apps", "observability", "datastores"]);
    }

    #[tokio::test]
    async fn second_cleanup_is_a_no_op() {
        let mut mgr = CleanupManager::new();
        mgr.register(&noop_layer("datastores"), EnvMap::new());
        assert_eq!(mgr.cleanup_all().await, ["datastores"]);
        assert!(mgr.cleanup_all().await.is_empty());
    }

    #[tokio::test]
    async fn failing_stop_actions_never_escalate() {
        let mut layer = noop_layer("datastores");
        layer.stop = ActionSpec { program: "false".into(), args: vec![], cwd: None };
        let mut mgr = CleanupManager::new();
        mgr.register(&layer, EnvMap::new());
        mgr.register(&noop_layer("apps"), EnvMap::new());
        // Both layers get a stop attempt despite the failure.
        assert_eq!(mgr.cleanup_all().await, ["apps", "datastores"]);
    }
}
