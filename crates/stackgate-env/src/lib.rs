//! Environment provisioner: builds the key/value environment a layer needs
//! before launch. Values are ephemeral and scoped to one run.

use std::collections::BTreeMap;
use std::fmt;

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use thiserror::Error;

use stackgate_core::{EnvSource, LayerSpec};

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("layer '{layer}' requires environment variable '{name}' and no override or process value was supplied")]
    MissingVariable { layer: String, name: String },
}

/// A provisioned value. Display and Debug redact so values never leak into
/// logs or summaries verbatim.
#[derive(Clone, PartialEq, Eq)]
pub struct EnvValue {
    value: String,
    sensitive: bool,
}

impl EnvValue {
    pub fn plain(value: impl Into<String>) -> Self {
        Self { value: value.into(), sensitive: false }
    }

    pub fn secret(value: impl Into<String>) -> Self {
        Self { value: value.into(), sensitive: true }
    }

    /// The raw value, for handing to a child process environment.
    pub fn expose(&self) -> &str {
        &self.value
    }

    pub fn is_sensitive(&self) -> bool {
        self.sensitive
    }
}

impl fmt::Debug for EnvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sensitive {
            f.write_str("EnvValue(<redacted>)")
        } else {
            write!(f, "EnvValue({})", self.value)
        }
    }
}

impl fmt::Display for EnvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sensitive {
            f.write_str("<redacted>")
        } else {
            f.write_str(&self.value)
        }
    }
}

pub type EnvMap = BTreeMap<String, EnvValue>;

/// Provisions layer environments for one run. The same layer id provisioned
/// twice in a run yields the same values; a fresh provisioner (a fresh run)
/// yields fresh secrets.
pub struct Provisioner {
    overrides: BTreeMap<String, String>,
    provisioned: BTreeMap<String, EnvMap>,
}

impl Provisioner {
    pub fn new(overrides: BTreeMap<String, String>) -> Self {
        Self { overrides, provisioned: BTreeMap::new() }
    }

    /// Build the environment for one layer. Precedence: caller overrides >
    /// process environment (for caller-sourced vars) > static defaults >
    /// generated secrets. Fails fast on a missing caller-sourced variable.
    pub fn provision(&mut self, layer: &LayerSpec) -> Result<EnvMap, ProvisionError> {
        if let Some(existing) = self.provisioned.get(&layer.id) {
            return Ok(existing.clone());
        }

        let mut env = EnvMap::new();
        for req in &layer.env {
            let value = match &req.source {
                EnvSource::Static { value } => match self.overrides.get(&req.name) {
                    Some(over) => EnvValue::plain(over.clone()),
                    None => EnvValue::plain(value.clone()),
                },
                EnvSource::Secret { min_len } => match self.overrides.get(&req.name) {
                    Some(over) => EnvValue::secret(over.clone()),
                    None => EnvValue::secret(generate_secret(*min_len)),
                },
                EnvSource::Caller => {
                    let supplied = self
                        .overrides
                        .get(&req.name)
                        .cloned()
                        .or_else(|| std::env::var(&req.name).ok());
                    match supplied {
                        Some(v) => EnvValue::secret(v),
                        None => {
                            return Err(ProvisionError::MissingVariable {
                                layer: layer.id.clone(),
                                name: req.name.clone(),
                            })
                        }
                    }
                }
            };
            env.insert(req.name.clone(), value);
        }

        self.provisioned.insert(layer.id.clone(), env.clone());
        Ok(env)
    }
}

/// Random alphanumeric token from the OS entropy source.
fn generate_secret(min_len: usize) -> String {
    let len = min_len.max(32);
    OsRng.sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}
