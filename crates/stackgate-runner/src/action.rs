use std::process::Stdio;

use stackgate_core::{tail_lines, ActionSpec};
use stackgate_env::EnvMap;
use stackgate_probe::OUTPUT_TAIL_LINES;

/// Run an external start/stop/setup action with the provisioned environment.
/// Returns the combined output tail on success, or an error description with
/// the output tail on a spawn failure or non-zero exit.
pub async fn run_action(action: &ActionSpec, env: &EnvMap) -> Result<String, String> {
    let mut cmd = tokio::process::Command::new(&action.program);
    cmd.args(&action.args)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.expose())))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &action.cwd {
        cmd.current_dir(cwd);
    }

    let out = match cmd.output().await {
        Ok(out) => out,
        Err(e) => return Err(format!("spawn {}: {e}", action.program)),
    };

    let mut text = String::from_utf8_lossy(&out.stdout).to_string();
    let stderr = String::from_utf8_lossy(&out.stderr);
    if !stderr.is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&stderr);
    }
    let text = tail_lines(&text, OUTPUT_TAIL_LINES);

    if out.status.success() {
        Ok(text)
    } else {
        Err(format!(
            "{} exited with {:?}\n{text}",
            action.program,
            out.status.code()
        ))
    }
}
