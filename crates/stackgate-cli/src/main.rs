#![forbid(unsafe_code)]

//! stackgate: staged infrastructure validation gate runner.
//!
//! Brings up a multi-layer service topology in strict dependency order,
//! probes each layer healthy before the next starts, and tears everything
//! down on exit. Exit codes: 0 success (warnings allowed), 1 required
//! failure, 2 invocation/config error, 130 interrupted.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stackgate_core::GateSpec;
use stackgate_env::Provisioner;
use stackgate_runner::{render_summary, write_json_report, GateRunner, RunOptions};
use stackgate_spec::{builtin_gate, builtin_names, load_gate};

#[derive(Parser, Debug)]
#[command(name = "stackgate", version)]
struct Args {
    /// Path to a gate definition YAML file, or a built-in gate name.
    #[arg(default_value = "loopback-smoke")]
    gate: String,

    /// Leave the stack running after the gate completes.
    #[arg(long)]
    skip_cleanup: bool,

    /// Scale every probe's retry interval and per-attempt timeout.
    #[arg(long, default_value_t = 1.0, value_parser = parse_multiplier)]
    timeout_multiplier: f64,

    /// Run only the named layer.
    #[arg(long)]
    only_layer: Option<String>,

    /// Write a machine-readable JSON report to this path.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Environment override, KEY=VALUE. Repeatable; highest precedence.
    #[arg(long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,

    /// Log level (env-filter syntax).
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(args.log.clone()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Any error reaching main is an invocation/config problem, exit 2.
    match run(args).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("stackgate: {e:#}");
            std::process::exit(2)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<i32> {
    let gate = resolve_gate(&args.gate)?;
    let overrides = parse_overrides(&args.env)?;

    let options = RunOptions {
        skip_cleanup: args.skip_cleanup,
        timeout_multiplier: args.timeout_multiplier,
        only_layer: args.only_layer,
    };

    let mut provisioner = Provisioner::new(overrides);
    let outcome = GateRunner::new(gate, options).run(&mut provisioner).await?;

    print!("{}", render_summary(&outcome));

    if let Some(path) = &args.report {
        write_json_report(path, &outcome)
            .with_context(|| format!("write report {}", path.display()))?;
        tracing::info!(path = %path.display(), "report written");
    }

    Ok(outcome.exit_code())
}

/// A gate argument that names an existing file is loaded from YAML;
/// anything else must be a built-in gate name.
fn resolve_gate(arg: &str) -> anyhow::Result<GateSpec> {
    let path = Path::new(arg);
    if path.exists() {
        Ok(load_gate(path)?)
    } else {
        builtin_gate(arg).map_err(|e| {
            anyhow::anyhow!("{e} (and no such file; built-ins: {})", builtin_names().join(", "))
        })
    }
}

fn parse_multiplier(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if !v.is_finite() || v <= 0.0 {
        return Err("timeout multiplier must be positive".into());
    }
    Ok(v)
}

fn parse_overrides(pairs: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            anyhow::bail!("--env '{pair}' is not KEY=VALUE");
        };
        if key.is_empty() {
            anyhow::bail!("--env '{pair}' has an empty key");
        }
        map.insert(key.to_string(), value.to_string());
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_parse_key_value_pairs() {
        let map = parse_overrides(&["PG_USER=admin".into(), "TOKEN=a=b".into()]).unwrap();
        assert_eq!(map.get("PG_USER").unwrap(), "admin");
        // Only the first '=' splits.
        assert_eq!(map.get("TOKEN").unwrap(), "a=b");
    }

    #[test]
    fn malformed_override_is_rejected() {
        assert!(parse_overrides(&["NOEQUALS".into()]).is_err());
        assert!(parse_overrides(&["=value".into()]).is_err());
    }

    #[test]
    fn unknown_gate_mentions_builtins() {
        let err = resolve_gate("definitely-not-a-gate").unwrap_err();
        assert!(err.to_string().contains("loopback-smoke"));
    }

    #[test]
    fn non_positive_timeout_multiplier_is_rejected() {
        assert!(Args::try_parse_from(["stackgate", "--timeout-multiplier", "0"]).is_err());
        assert!(Args::try_parse_from(["stackgate", "--timeout-multiplier=-1.5"]).is_err());
        assert!(Args::try_parse_from(["stackgate", "--timeout-multiplier", "nan"]).is_err());
        let args = Args::try_parse_from(["stackgate", "--timeout-multiplier", "2.5"]).unwrap();
        assert_eq!(args.timeout_multiplier, 2.5);
    }
}
