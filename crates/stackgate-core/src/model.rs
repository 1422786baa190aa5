use serde::{Deserialize, Serialize};

/// A full gate: the ordered sequence of layers evaluated in one run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GateSpec {
    pub gate: String,
    pub layers: Vec<LayerSpec>,
}

/// One deployable tier: a named group of services with explicit start and
/// stop actions. Layers are started strictly in declaration order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LayerSpec {
    pub id: String,
    /// Failure here aborts the whole run. Optional layers record warnings
    /// and let the sequence continue.
    #[serde(default = "default_true")]
    pub required_for_progress: bool,
    /// Ids of earlier layers this one depends on. If a listed layer failed
    /// while optional (or was itself skipped), this layer is skipped instead
    /// of started against a broken dependency.
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub env: Vec<EnvRequirement>,
    pub start: ActionSpec,
    pub stop: ActionSpec,
    pub services: Vec<ServiceSpec>,
}

/// One process/container within a layer, validated by one or more probes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub id: String,
    #[serde(default = "default_true")]
    pub required: bool,
    /// One-shot setup command run after the layer start action, before
    /// probing (e.g. "create database X").
    #[serde(default)]
    pub setup: Option<ActionSpec>,
    pub probes: Vec<ProbeSpec>,
}

/// Reference to an external command (start/stop/setup action).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: Option<String>,
}

/// A bounded-retry health check against one target.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProbeSpec {
    pub name: String,
    #[serde(flatten)]
    pub target: ProbeTarget,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    #[serde(default = "default_timeout_per_attempt_ms")]
    pub timeout_per_attempt_ms: u64,
}

impl ProbeSpec {
    /// Worst-case wall clock for this probe. The probe engine must reach a
    /// terminal result within this budget.
    pub fn budget_ms(&self) -> u64 {
        u64::from(self.max_attempts) * (self.retry_interval_ms + self.timeout_per_attempt_ms)
    }

    /// Scale retry interval and per-attempt timeout (CLI --timeout-multiplier).
    pub fn scaled(&self, multiplier: f64) -> ProbeSpec {
        let mut spec = self.clone();
        spec.retry_interval_ms = scale_ms(spec.retry_interval_ms, multiplier);
        spec.timeout_per_attempt_ms = scale_ms(spec.timeout_per_attempt_ms, multiplier);
        spec
    }

    pub fn kind(&self) -> ProbeKind {
        match self.target {
            ProbeTarget::Tcp { .. } => ProbeKind::Tcp,
            ProbeTarget::Http { .. } => ProbeKind::Http,
            ProbeTarget::Exec { .. } => ProbeKind::Exec,
        }
    }
}

fn scale_ms(ms: u64, multiplier: f64) -> u64 {
    (ms as f64 * multiplier).round().max(0.0) as u64
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    Tcp,
    Http,
    Exec,
}

impl ProbeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::Tcp => "tcp",
            ProbeKind::Http => "http",
            ProbeKind::Exec => "exec",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeTarget {
    /// Success is a completed connect.
    Tcp { host: String, port: u16 },
    /// Success is the expected status (exact when `expect_status` is set,
    /// otherwise any 2xx) and, if configured, a body substring match.
    Http {
        url: String,
        #[serde(default)]
        expect_status: Option<u16>,
        #[serde(default)]
        body_substring: Option<String>,
    },
    /// Success is exit code 0 and, if configured, a stdout substring match.
    Exec {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        stdout_substring: Option<String>,
    },
}

/// One environment variable a layer needs before launch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvRequirement {
    pub name: String,
    #[serde(flatten)]
    pub source: EnvSource,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum EnvSource {
    /// Fixed default for the run (versions, usernames).
    Static { value: String },
    /// Ephemeral secret generated fresh each run.
    Secret {
        #[serde(default = "default_secret_len")]
        min_len: usize,
    },
    /// Must be supplied by the caller (override or process environment).
    Caller,
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_interval_ms() -> u64 {
    2_000
}

fn default_timeout_per_attempt_ms() -> u64 {
    5_000
}

fn default_secret_len() -> usize {
    32
}
