use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;

use stackgate_core::{now_ms, tail_lines, CheckOutcome, CheckResult, RunStatus};

use crate::runner::{RunOutcome, Termination};

/// Lines of captured output echoed for each failed required check.
const EXCERPT_LINES: usize = 15;

/// Machine-readable run report for CI consumption.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub gate: &'a str,
    pub run_id: &'a str,
    pub status: &'static str,
    pub generated_at_ms: i64,
    pub results: &'a [CheckResult],
}

fn status_label(termination: &Termination) -> &'static str {
    match termination {
        Termination::Completed(RunStatus::Success) => "success",
        Termination::Completed(RunStatus::SuccessWithWarnings) => "success_with_warnings",
        Termination::Completed(RunStatus::Failed) => "failed",
        Termination::Aborted { .. } => "failed",
        Termination::Interrupted => "interrupted",
    }
}

/// Write the machine-readable summary as pretty JSON.
pub fn write_json_report(path: &Path, outcome: &RunOutcome) -> std::io::Result<()> {
    let report = Report {
        gate: &outcome.gate,
        run_id: outcome.run_id.as_str(),
        status: status_label(&outcome.termination),
        generated_at_ms: now_ms(),
        results: &outcome.results,
    };
    let json = serde_json::to_vec_pretty(&report)?;
    std::fs::write(path, json)
}

/// Render the human summary. Groups results by outcome, prints counts and
/// names, and excerpts captured output for every failed required check so a
/// non-zero exit always comes with an explanation.
pub fn render_summary(outcome: &RunOutcome) -> String {
    let mut passed = Vec::new();
    let mut warned = Vec::new();
    let mut failed = Vec::new();
    for r in &outcome.results {
        match r.outcome {
            CheckOutcome::Passed => passed.push(r),
            CheckOutcome::Warned => warned.push(r),
            CheckOutcome::Failed => failed.push(r),
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "gate '{}' run {}", outcome.gate, outcome.run_id.as_str());
    let _ = writeln!(
        out,
        "checks: {} passed, {} warned, {} failed",
        passed.len(),
        warned.len(),
        failed.len()
    );

    for r in &passed {
        let _ = writeln!(out, "  PASS {} [{}] ({}ms, {} attempts)", r.name, r.kind, r.duration_ms, r.attempts);
    }
    for r in &warned {
        let _ = writeln!(out, "  WARN {} [{}] ({}ms, {} attempts)", r.name, r.kind, r.duration_ms, r.attempts);
    }
    for r in &failed {
        let _ = writeln!(out, "  FAIL {} [{}] ({}ms, {} attempts)", r.name, r.kind, r.duration_ms, r.attempts);
    }

    for r in failed.iter().filter(|r| r.required && !r.output.is_empty()) {
        let _ = writeln!(out, "\n--- output: {} (last {} lines) ---", r.name, EXCERPT_LINES);
        let _ = writeln!(out, "{}", tail_lines(&r.output, EXCERPT_LINES));
    }

    match &outcome.termination {
        Termination::Completed(RunStatus::Success) => {
            let _ = writeln!(out, "\nresult: success");
        }
        Termination::Completed(RunStatus::SuccessWithWarnings) => {
            let _ = writeln!(out, "\nresult: success with warnings");
        }
        Termination::Completed(RunStatus::Failed) => {
            let _ = writeln!(out, "\nresult: failed");
        }
        Termination::Aborted { layer, reason } => {
            let _ = writeln!(out, "\nresult: aborted at layer '{layer}': {reason}");
        }
        Termination::Interrupted => {
            let _ = writeln!(out, "\nresult: interrupted");
        }
    }

    out
}
