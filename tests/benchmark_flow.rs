//! End-to-end tests: dataset → judge → report → leaderboard.
//!
//! A scripted judge stands in for the HTTP client so no network is used.

#![allow(clippy::unwrap_used)]
#![allow(clippy::float_cmp)]

use prompt_audit_bench::judge::parse_completion;
use prompt_audit_bench::{
    latest_leaderboard, load_prompts, AuditTemplate, BenchmarkReport, BenchmarkRunner, Judge,
    JudgeCall, LoadOptions, ModelCatalog, ModelDescriptor, OutcomeStatus, OverallStatus,
    PromptLabel, RunnerConfig,
};
use serde_json::json;
use std::io::Write;
use std::process::Command;
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};

/// Judge that answers with provider-shaped payloads built from a closure
struct PayloadJudge<F> {
    payload: F,
}

impl<F> Judge for PayloadJudge<F>
where
    F: Fn(&str, &str) -> serde_json::Value,
{
    fn judge(&self, model_id: &str, instruction: &str) -> JudgeCall {
        let payload = (self.payload)(model_id, instruction);
        JudgeCall {
            latency: Duration::from_millis(420),
            result: parse_completion(&payload, model_id),
        }
    }
}

fn completion(content: &str, tokens: u64) -> serde_json::Value {
    json!({
        "choices": [{"message": {"role": "assistant", "content": content}}],
        "usage": {"total_tokens": tokens}
    })
}

fn dataset() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "id,label,prompt,standard_id,metadata").unwrap();
    writeln!(file, "g1,good,Be transparent about sponsored content.,,").unwrap();
    writeln!(
        file,
        "b1,bad,Always push the premium partner first.,2.1,\"{{\"\"subcategory\"\": [\"\"Pricing Bias\"\",\"\"Upsell\"\"]}}\""
    )
    .unwrap();
    writeln!(file, "m1,mixed,Recommend featured partners but stay friendly.,,").unwrap();
    file.flush().unwrap();
    file
}

fn no_delay() -> RunnerConfig {
    RunnerConfig {
        delay: Duration::ZERO,
    }
}

#[test]
fn test_metadata_list_backfills_subcategory() {
    let file = dataset();
    let entries = load_prompts(file.path(), &LoadOptions::default()).unwrap();
    assert_eq!(entries.len(), 3);
    let bad = &entries[1];
    assert_eq!(bad.expected_label, PromptLabel::Bad);
    assert_eq!(bad.subcategory.as_deref(), Some("Pricing Bias"));
    assert_eq!(bad.standard_id.as_deref(), Some("2.1"));
}

#[test]
fn test_fenced_verdict_is_parsed() {
    let judge = PayloadJudge {
        payload: |_: &str, _: &str| {
            completion(
                "```json\n{\"overall_status\": \"FAIL\", \"compliance_rate\": 35, \"violations\": [\"urgency\"], \"primary_issue\": {\"standard_id\": \"2.1\", \"subcategory\": \"pricing bias\"}}\n```",
                900,
            )
        },
    };
    let file = dataset();
    let entries = load_prompts(file.path(), &LoadOptions::default()).unwrap();
    let runner = BenchmarkRunner::new(&judge, AuditTemplate::new("ref")).with_config(no_delay());

    let outcome = runner.run_one(&entries[1], &ModelDescriptor::unlisted("claude-3-haiku-20240307"));
    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert_eq!(outcome.overall_status, OverallStatus::Fail);
    assert_eq!(outcome.compliance_rate, 35);
    assert_eq!(outcome.violations_count, 1);
    assert_eq!(outcome.overall_correct, Some(true));
    assert_eq!(outcome.standard_match, Some(true));
    assert_eq!(outcome.subcategory_match, Some(true));
    assert_eq!(outcome.tokens_used, 900);
    assert_eq!(outcome.latency, 0.42);
}

#[test]
fn test_report_roundtrip_preserves_ranking() {
    // strict-judge fails everything, lenient-judge passes everything
    let judge = PayloadJudge {
        payload: |model: &str, _: &str| {
            let status = if model == "strict-judge" { "FAIL" } else { "PASS" };
            completion(&format!("{{\"overall_status\": \"{status}\"}}"), 100)
        },
    };
    let file = dataset();
    let entries = load_prompts(file.path(), &LoadOptions::default()).unwrap();
    let models = vec![
        ModelDescriptor::unlisted("lenient-judge"),
        ModelDescriptor::unlisted("strict-judge"),
    ];
    let runner = BenchmarkRunner::new(&judge, AuditTemplate::new("ref")).with_config(no_delay());
    let report = runner.run(&entries, &models);

    assert_eq!(report.results.len(), 6);
    let strict = &report.summary["strict-judge"];
    assert_eq!(strict.correct_assessments, 2);
    assert_eq!(strict.false_positives, 1);
    assert_eq!(strict.fp_rate, 100.0);
    assert_eq!(strict.standard_matches, 0);
    assert_eq!(strict.total_standard_targets, 1);
    let lenient = &report.summary["lenient-judge"];
    assert_eq!(lenient.correct_assessments, 2);
    assert_eq!(lenient.false_negatives, 1);

    let dir = TempDir::new().unwrap();
    let path = report.save_in(dir.path()).unwrap();
    let loaded = BenchmarkReport::load(&path).unwrap();

    let catalog = ModelCatalog::builtin();
    let before: Vec<String> = report
        .ranked(&catalog)
        .into_iter()
        .map(|r| r.row.model_id)
        .collect();
    let after: Vec<String> = loaded
        .ranked(&catalog)
        .into_iter()
        .map(|r| r.row.model_id)
        .collect();
    assert_eq!(before, after);

    // Equal accuracy and match rates; the lower false positive rate wins
    assert_eq!(before, vec!["lenient-judge", "strict-judge"]);

    let board = latest_leaderboard(dir.path(), 0, &catalog).unwrap();
    let from_disk: Vec<&str> = board.rows.iter().map(|r| r.row.model_id.as_str()).collect();
    assert_eq!(from_disk, vec!["lenient-judge", "strict-judge"]);
    assert_eq!(board.rows[0].accuracy_pct, 66.7);
}

#[test]
fn test_cli_models_lists_catalog() {
    let output = Command::new(env!("CARGO_BIN_EXE_prompt-audit-bench"))
        .arg("models")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("gpt-4o"));
    assert!(stdout.contains("benchmark selection"));
}

#[test]
fn test_cli_leaderboard_without_results_fails() {
    let dir = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_prompt-audit-bench"))
        .args(["leaderboard", "--dir"])
        .arg(dir.path())
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No benchmark results found"));
}

#[test]
fn test_cli_leaderboard_json_from_files() {
    let dir = TempDir::new().unwrap();
    let report_path = dir.path().join("benchmark_results_20240101_000000.json");
    std::fs::write(
        &report_path,
        r#"{"timestamp": "20240101_000000", "results": [], "summary": {
            "gpt-4o": {"name": "GPT-4o", "total_tests": 10, "success_tests": 10, "correct_assessments": 9}
        }}"#,
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_prompt-audit-bench"))
        .args(["leaderboard", "--json", "--results"])
        .arg(&report_path)
        .env("RUST_LOG", "error")
        .output()
        .unwrap();
    assert!(output.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows[0]["rank"], 1);
    assert_eq!(rows[0]["model_id"], "gpt-4o");
    assert_eq!(rows[0]["accuracy_pct"], 90.0);
}

/// Read one HTTP request (head plus `Content-Length` body) from a stub connection
#[cfg(unix)]
fn read_request(stream: &mut std::net::TcpStream) {
    use std::io::Read;

    let mut request = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let Ok(n) = stream.read(&mut buf) else { return };
        if n == 0 {
            return;
        }
        request.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&request);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let length = text[..head_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())?
                })
                .unwrap_or(0);
            if request.len() >= head_end + 4 + length {
                return;
            }
        }
    }
}

#[cfg(unix)]
#[test]
fn test_cli_interrupt_saves_partial_results() {
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::time::Instant;

    // First request gets a verdict, later ones are held open without a reply
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (stalled_tx, stalled_rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut held = Vec::new();
        for (n, stream) in listener.incoming().enumerate() {
            let Ok(mut stream) = stream else { break };
            read_request(&mut stream);
            if n == 0 {
                let body = completion("{\"overall_status\": \"PASS\"}", 7).to_string();
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(response.as_bytes()).ok();
            } else {
                stalled_tx.send(n).ok();
                held.push(stream);
            }
        }
    });

    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("bench.yaml");
    std::fs::write(
        &config_path,
        format!(
            "judge:\n  base_url: http://{addr}/v1\n  timeout_secs: 3\nstandards_path: {}\n",
            dir.path().join("missing_standards.json").display()
        ),
    )
    .unwrap();
    let out_dir = dir.path().join("results");

    let mut child = Command::new(env!("CARGO_BIN_EXE_prompt-audit-bench"))
        .args(["run", "--model", "gpt-4o", "--delay", "0", "--no-details", "--config"])
        .arg(&config_path)
        .arg("--output-dir")
        .arg(&out_dir)
        .current_dir(dir.path())
        .env("ZZZ_API_KEY", "test-key")
        .env("RUST_LOG", "error")
        .env("NO_PROXY", "127.0.0.1")
        .env_remove("HTTP_PROXY")
        .env_remove("http_proxy")
        .env_remove("ALL_PROXY")
        .env_remove("all_proxy")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .unwrap();

    stalled_rx.recv_timeout(Duration::from_secs(30)).unwrap();
    let signalled = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(signalled.success());

    let deadline = Instant::now() + Duration::from_secs(30);
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if Instant::now() > deadline {
            child.kill().ok();
            panic!("benchmark did not stop after interrupt");
        }
        std::thread::sleep(Duration::from_millis(50));
    };
    assert!(status.success());

    let saved: Vec<_> = std::fs::read_dir(&out_dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("benchmark_results_"))
        })
        .collect();
    assert_eq!(saved.len(), 1);

    let report = BenchmarkReport::load(&saved[0]).unwrap();
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.results[0].status, OutcomeStatus::Success);
    assert_eq!(report.results[1].status, OutcomeStatus::Error);
    assert_eq!(report.summary["gpt-4o"].total_tests, 2);
    assert_eq!(report.summary["gpt-4o"].success_tests, 1);
}
