use thiserror::Error;

/// Malformed or structurally invalid gate definition. Always fatal and
/// always detected before any service is started.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read gate definition {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse gate definition {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unknown built-in gate '{0}'")]
    UnknownBuiltin(String),

    #[error("gate definition invalid: {0}")]
    Invalid(String),
}
