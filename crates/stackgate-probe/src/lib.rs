//! Bounded-retry health probes: TCP connect, HTTP GET with expected
//! status/body, or a local command exit check.
//!
//! A probe never returns an error. Every failure mode becomes a `Failed`
//! CheckResult so callers decide severity. Probes mutate no shared state and
//! are safe to run concurrently.

use std::time::{Duration, Instant};

use stackgate_core::{now_ms, tail_lines, CheckOutcome, CheckResult, ProbeSpec, ProbeTarget};

/// Lines of captured output kept on a CheckResult.
pub const OUTPUT_TAIL_LINES: usize = 15;

/// Shared probe client. One per run; the HTTP client is reused across
/// attempts and probes.
#[derive(Clone)]
pub struct ProbeClient {
    http: reqwest::Client,
}

impl ProbeClient {
    pub fn new() -> Self {
        Self { http: reqwest::Client::new() }
    }
}

impl Default for ProbeClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one probe to a terminal result. Attempts the check up to
/// `max_attempts` times, sleeping `retry_interval_ms` between attempts and
/// bounding each attempt at `timeout_per_attempt_ms`. Total wall clock never
/// exceeds `spec.budget_ms()`.
pub async fn run_probe(
    client: &ProbeClient,
    spec: &ProbeSpec,
    layer: &str,
    required: bool,
) -> CheckResult {
    let started = Instant::now();
    let mut last_error = String::new();

    for attempt in 1..=spec.max_attempts {
        let outcome = tokio::time::timeout(
            Duration::from_millis(spec.timeout_per_attempt_ms),
            attempt_once(client, &spec.target),
        )
        .await;

        match outcome {
            Ok(Ok(output)) => {
                tracing::debug!(probe = %spec.name, attempt, "probe passed");
                return CheckResult {
                    name: spec.name.clone(),
                    layer: layer.to_string(),
                    kind: spec.kind().as_str().to_string(),
                    outcome: CheckOutcome::Passed,
                    required,
                    attempts: attempt,
                    duration_ms: started.elapsed().as_millis() as u64,
                    output: tail_lines(&output, OUTPUT_TAIL_LINES),
                    completed_at_ms: now_ms(),
                };
            }
            Ok(Err(err)) => {
                tracing::debug!(probe = %spec.name, attempt, error = %err, "probe attempt failed");
                last_error = err;
            }
            Err(_) => {
                last_error = format!("attempt timed out after {}ms", spec.timeout_per_attempt_ms);
                tracing::debug!(probe = %spec.name, attempt, "probe attempt timed out");
            }
        }

        if attempt < spec.max_attempts {
            tokio::time::sleep(Duration::from_millis(spec.retry_interval_ms)).await;
        }
    }

    CheckResult {
        name: spec.name.clone(),
        layer: layer.to_string(),
        kind: spec.kind().as_str().to_string(),
        outcome: CheckOutcome::Failed,
        required,
        attempts: spec.max_attempts,
        duration_ms: started.elapsed().as_millis() as u64,
        output: tail_lines(&last_error, OUTPUT_TAIL_LINES),
        completed_at_ms: now_ms(),
    }
}

async fn attempt_once(client: &ProbeClient, target: &ProbeTarget) -> Result<String, String> {
    match target {
        ProbeTarget::Tcp { host, port } => attempt_tcp(host, *port).await,
        ProbeTarget::Http { url, expect_status, body_substring } => {
            attempt_http(client, url, *expect_status, body_substring.as_deref()).await
        }
        ProbeTarget::Exec { program, args, stdout_substring } => {
            attempt_exec(program, args, stdout_substring.as_deref()).await
        }
    }
}

async fn attempt_tcp(host: &str, port: u16) -> Result<String, String> {
    match tokio::net::TcpStream::connect((host, port)).await {
        Ok(_) => Ok(format!("connected to {host}:{port}")),
        Err(e) => Err(format!("connect {host}:{port}: {e}")),
    }
}

async fn attempt_http(
    client: &ProbeClient,
    url: &str,
    expect_status: Option<u16>,
    body_substring: Option<&str>,
) -> Result<String, String> {
    let resp = client.http.get(url).send().await.map_err(|e| format!("GET {url}: {e}"))?;
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();

    let status_ok = match expect_status {
        Some(code) => status.as_u16() == code,
        None => status.is_success(),
    };
    if !status_ok {
        return Err(format!("GET {url}: unexpected status {status}, body: {body}"));
    }

    if let Some(needle) = body_substring {
        if !body.contains(needle) {
            return Err(format!("GET {url}: status {status} but body missing '{needle}': {body}"));
        }
    }

    Ok(format!("GET {url}: {status}\n{body}"))
}

async fn attempt_exec(
    program: &str,
    args: &[String],
    stdout_substring: Option<&str>,
) -> Result<String, String> {
    let out = tokio::process::Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| format!("spawn {program}: {e}"))?;

    let stdout = String::from_utf8_lossy(&out.stdout).to_string();
    let stderr = String::from_utf8_lossy(&out.stderr).to_string();

    if !out.status.success() {
        return Err(format!("{program} exited with {:?}\n{stderr}", out.status.code()));
    }

    if let Some(needle) = stdout_substring {
        if !stdout.contains(needle) {
            return Err(format!("{program} succeeded but stdout missing '{needle}':\n{stdout}"));
        }
    }

    Ok(stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn spec(name: &str, target: ProbeTarget, max_attempts: u32, retry_ms: u64, timeout_ms: u64) -> ProbeSpec {
        ProbeSpec {
            name: name.into(),
            target,
            max_attempts,
            retry_interval_ms: retry_ms,
            timeout_per_attempt_ms: timeout_ms,
        }
    }

    #[tokio::test]
    async fn tcp_probe_passes_on_open_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let client = ProbeClient::new();
        let spec = spec(
            "open-port",
            ProbeTarget::Tcp { host: "127.0.0.1".into(), port },
            3,
            10,
            500,
        );
        let result = run_probe(&client, &spec, "datastores", true).await;
        assert_eq!(result.outcome, CheckOutcome::Passed);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.kind, "tcp");
    }

    #[tokio::test]
    async fn tcp_probe_exhausts_attempts_on_closed_port() {
        // Bind then drop so the port is very likely closed.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = ProbeClient::new();
        let spec = spec(
            "closed-port",
            ProbeTarget::Tcp { host: "127.0.0.1".into(), port },
            2,
            10,
            200,
        );
        let result = run_probe(&client, &spec, "datastores", false).await;
        assert_eq!(result.outcome, CheckOutcome::Failed);
        assert_eq!(result.attempts, 2);
        assert!(!result.output.is_empty());
    }

    #[tokio::test]
    async fn probe_respects_wall_clock_budget() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = ProbeClient::new();
        let spec = spec(
            "budget",
            ProbeTarget::Tcp { host: "127.0.0.1".into(), port },
            3,
            50,
            100,
        );
        let started = Instant::now();
        let result = run_probe(&client, &spec, "datastores", true).await;
        assert_eq!(result.outcome, CheckOutcome::Failed);
        // Budget is 3 * (50 + 100) = 450ms; allow scheduling slack.
        assert!(started.elapsed().as_millis() < 1_000);
    }

    #[tokio::test]
    async fn exec_probe_checks_exit_code_and_stdout() {
        let client = ProbeClient::new();

        let ok = spec(
            "echo",
            ProbeTarget::Exec {
                program: "sh".into(),
                args: vec!["-c".into(), "echo ready".into()],
                stdout_substring: Some("ready".into()),
            },
            1,
            0,
            2_000,
        );
        let result = run_probe(&client, &ok, "apps", true).await;
        assert_eq!(result.outcome, CheckOutcome::Passed);
        assert!(result.output.contains("ready"));

        let bad_exit = spec(
            "false",
            ProbeTarget::Exec { program: "false".into(), args: vec![], stdout_substring: None },
            2,
            10,
            2_000,
        );
        let result = run_probe(&client, &bad_exit, "apps", true).await;
        assert_eq!(result.outcome, CheckOutcome::Failed);
        assert_eq!(result.attempts, 2);

        let wrong_stdout = spec(
            "wrong",
            ProbeTarget::Exec {
                program: "sh".into(),
                args: vec!["-c".into(), "echo nope".into()],
                stdout_substring: Some("ready".into()),
            },
            1,
            0,
            2_000,
        );
        let result = run_probe(&client, &wrong_stdout, "apps", true).await;
        assert_eq!(result.outcome, CheckOutcome::Failed);
        assert!(result.output.contains("missing"));
    }

    /// Minimal one-connection-at-a-time HTTP responder for probe tests.
    async fn serve_responses(listener: tokio::net::TcpListener, responses: Vec<(u16, &'static str)>) {
        for (status, body) in responses {
            let (mut sock, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            let mut buf = [0u8; 4096];
            let _ = sock.read(&mut buf).await;
            let reason = match status {
                200 => "OK",
                503 => "Service Unavailable",
                _ => "Other",
            };
            let resp = format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = sock.write_all(resp.as_bytes()).await;
            let _ = sock.shutdown().await;
        }
    }

    #[tokio::test]
    async fn http_probe_recovers_after_503s() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(serve_responses(
            listener,
            vec![(503, ""), (503, ""), (200, "ok")],
        ));

        let client = ProbeClient::new();
        let spec = spec(
            "api-health",
            ProbeTarget::Http {
                url: format!("http://127.0.0.1:{port}/health"),
                expect_status: Some(200),
                body_substring: Some("ok".into()),
            },
            3,
            10,
            2_000,
        );
        let result = run_probe(&client, &spec, "apps", true).await;
        assert_eq!(result.outcome, CheckOutcome::Passed);
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test]
    async fn http_probe_fails_on_wrong_body() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(serve_responses(listener, vec![(200, "degraded")]));

        let client = ProbeClient::new();
        let spec = spec(
            "api-health",
            ProbeTarget::Http {
                url: format!("http://127.0.0.1:{port}/health"),
                expect_status: Some(200),
                body_substring: Some("healthy".into()),
            },
            1,
            0,
            2_000,
        );
        let result = run_probe(&client, &spec, "apps", false).await;
        assert_eq!(result.outcome, CheckOutcome::Failed);
        assert!(result.output.contains("missing 'healthy'"));
    }
}
