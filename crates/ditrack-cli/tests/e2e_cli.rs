//! E2E tests for the `ditrack` binary.
//!
//! Each test runs the binary as a subprocess in an isolated temp directory
//! with its own config home, so no user config leaks in.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

fn ditrack(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("ditrack"));
    cmd.current_dir(dir);
    cmd.env("HOME", dir);
    cmd.env("XDG_CONFIG_HOME", dir.join(".config"));
    // Nothing in these tests may reach a real ticketing API.
    cmd.env("DITRACK_TICKETING_URL", "http://127.0.0.1:9");
    cmd.env("DITRACK_LOG", "error");
    cmd
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("command should not crash");
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

fn encode(dir: &Path, state: &str) -> String {
    let out = json_stdout(ditrack(dir).args(["encode", "prop-1", "di-1", state, "--json"]));
    out["message"].as_str().expect("message").to_string()
}

fn write_fixture(dir: &Path, fixture: &Value) -> std::path::PathBuf {
    let path = dir.join("fixture.json");
    std::fs::write(&path, serde_json::to_vec_pretty(fixture).unwrap()).unwrap();
    path
}

fn closed_item() -> Value {
    json!({
        "property": "prop-1",
        "state": "closed",
        "stateHistory": {
            "s1": { "createdAt": 1, "state": "completed", "user": "u1" },
            "s2": { "createdAt": 2, "state": "closed", "user": "u1" }
        }
    })
}

/// Serve one canned response per expected request; report request lines.
fn serve(count: usize, response: &'static str) -> (String, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for _ in 0..count {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            let mut content_length = 0_usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap_or(0);
                }
            }
            let mut body = vec![0_u8; content_length];
            reader.read_exact(&mut body).unwrap();
            tx.send(format!(
                "{} {}",
                request_line.trim(),
                String::from_utf8_lossy(&body)
            ))
            .unwrap();
            stream.write_all(response.as_bytes()).unwrap();
        }
    });
    (format!("http://{addr}"), rx)
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

#[test]
fn encode_then_decode_returns_the_same_fields() {
    let dir = TempDir::new().unwrap();
    let encoded = json_stdout(ditrack(dir.path()).args([
        "encode",
        "prop-1",
        "di-1",
        "deferred",
        "--write-version",
        "7",
        "--json",
    ]));
    assert_eq!(encoded["path"], "prop-1/di-1/state/deferred/7");

    let message = encoded["message"].as_str().unwrap();
    let decoded = json_stdout(ditrack(dir.path()).args(["decode", message, "--json"]));
    assert_eq!(decoded["propertyId"], "prop-1");
    assert_eq!(decoded["itemId"], "di-1");
    assert_eq!(decoded["state"], "deferred");
    assert_eq!(decoded["writeVersion"], 7);
}

#[test]
fn decode_rejects_garbage() {
    let dir = TempDir::new().unwrap();
    ditrack(dir.path())
        .args(["decode", "!!not-base64!!"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("decode state-change message"));
}

#[test]
fn encode_rejects_slashes() {
    let dir = TempDir::new().unwrap();
    ditrack(dir.path())
        .args(["encode", "prop/1", "di-1", "pending"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must not contain"));
}

// ---------------------------------------------------------------------------
// Templates and config
// ---------------------------------------------------------------------------

#[test]
fn templates_render_the_transition_comment() {
    let dir = TempDir::new().unwrap();
    ditrack(dir.path())
        .args([
            "templates",
            "requires-action",
            "pending",
            "--field",
            "firstName=Ada",
            "--field",
            "lastName=Lovelace",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Deficient Item moved from requires-action to pending by Ada Lovelace",
        ));
}

#[test]
fn templates_come_from_the_config_file() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("custom.toml");
    std::fs::write(
        &config,
        "[comments.templates]\n\
         default = \"{{previousState}} -> {{currentState}}\"\n",
    )
    .unwrap();

    let preview = json_stdout(ditrack(dir.path()).args([
        "templates",
        "pending",
        "incomplete",
        "--config",
        config.to_str().unwrap(),
        "--json",
    ]));
    assert_eq!(preview["candidates"], json!(["{{previousState}} -> {{currentState}}"]));
    assert_eq!(preview["rendered"], json!(["pending -> incomplete"]));
}

#[test]
fn templates_reject_empty_state() {
    let dir = TempDir::new().unwrap();
    ditrack(dir.path())
        .args(["templates", "", "pending"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("non-empty"));
}

#[test]
fn config_reports_defaults_and_env_override() {
    let dir = TempDir::new().unwrap();
    let view = json_stdout(ditrack(dir.path()).args(["config", "--json"]));
    assert_eq!(view["source"], Value::Null);
    assert_eq!(view["config"]["ticketing"]["base_url"], "http://127.0.0.1:9");
    assert!(
        view["store_path"]
            .as_str()
            .unwrap()
            .ends_with(".ditrack/ditrack.sqlite3")
    );
}

#[test]
fn missing_explicit_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    ditrack(dir.path())
        .args(["config", "--config", "nope.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

// ---------------------------------------------------------------------------
// Import and deliver
// ---------------------------------------------------------------------------

#[test]
fn deliver_without_a_linked_card_skips_everything() {
    let dir = TempDir::new().unwrap();
    let fixture = write_fixture(dir.path(), &json!({ "items": { "di-1": closed_item() } }));
    ditrack(dir.path())
        .args(["import", fixture.to_str().unwrap()])
        .assert()
        .success();

    let message = encode(dir.path(), "pending");
    let report = json_stdout(ditrack(dir.path()).args(["deliver", &message, "--json"]));

    assert_eq!(report["dead_letters"], json!([]));
    let outcomes = report["outcomes"].as_array().unwrap();
    assert_eq!(outcomes.len(), 5);
    for outcome in outcomes {
        let text = outcome["outcome"].as_str().unwrap();
        assert!(text.starts_with("skipped"), "unexpected outcome: {outcome}");
    }
}

#[test]
fn deliver_reports_malformed_messages_and_fails() {
    let dir = TempDir::new().unwrap();
    let output = ditrack(dir.path())
        .args(["deliver", "bm90LWEtcGF0aA==", "--json"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    let letters = report["dead_letters"].as_array().unwrap();
    assert_eq!(letters.len(), 5);
    assert!(letters.iter().all(|letter| letter["code"] == "E2001"));
}

#[test]
fn import_mirrors_into_the_legacy_store() {
    let dir = TempDir::new().unwrap();
    let mirrored = dir.path().join("mirrored.toml");
    std::fs::write(
        &mirrored,
        "[store]\npath = \"primary.sqlite3\"\nlegacy_path = \"legacy.sqlite3\"\n",
    )
    .unwrap();
    let fixture = write_fixture(
        dir.path(),
        &json!({
            "items": { "di-1": closed_item() },
            "cards": [{
                "organizationId": "org-1",
                "propertyId": "prop-1",
                "cardId": "card-1",
                "itemId": "di-1"
            }]
        }),
    );
    ditrack(dir.path())
        .args(["import", fixture.to_str().unwrap(), "--config"])
        .arg(&mirrored)
        .assert()
        .success();

    // Read the legacy file directly: the card and item must be there, so the
    // handlers get as far as the (absent) credentials.
    let legacy_only = dir.path().join("legacy.toml");
    std::fs::write(&legacy_only, "[store]\npath = \"legacy.sqlite3\"\n").unwrap();
    let message = encode(dir.path(), "closed");
    let report = json_stdout(
        ditrack(dir.path())
            .args(["deliver", &message, "--json", "--config"])
            .arg(&legacy_only),
    );
    let close = report["outcomes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|outcome| outcome["handler"] == "close")
        .expect("close outcome");
    assert_eq!(close["outcome"], "skipped (no-credentials)");
}

#[test]
fn deliver_closes_and_comments_on_the_linked_card() {
    let (base_url, requests) = serve(
        2,
        "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}",
    );
    let dir = TempDir::new().unwrap();
    let fixture = write_fixture(
        dir.path(),
        &json!({
            "items": { "di-1": closed_item() },
            "users": { "u1": { "firstName": "Ada", "lastName": "Lovelace" } },
            "credentials": { "org-1": { "authToken": "tok", "apiKey": "key" } },
            "integrations": [{
                "propertyId": "prop-1",
                "organizationId": "org-1",
                "closedList": "list-closed"
            }],
            "cards": [{
                "organizationId": "org-1",
                "propertyId": "prop-1",
                "cardId": "card-1",
                "itemId": "di-1"
            }]
        }),
    );
    ditrack(dir.path())
        .args(["import", fixture.to_str().unwrap()])
        .assert()
        .success();

    let message = encode(dir.path(), "closed");
    let report = json_stdout(
        ditrack(dir.path())
            .env("DITRACK_TICKETING_URL", &base_url)
            .args(["deliver", &message, "--json"]),
    );
    assert_eq!(report["dead_letters"], json!([]));

    let mut seen: Vec<String> = requests.iter().take(2).collect();
    seen.sort();
    assert!(seen[0].starts_with("POST /1/cards/card-1/actions/comments?"));
    assert!(seen[0].contains("Deficient+Item+closed+by+Ada+Lovelace"));
    assert!(seen[1].starts_with("PUT /1/cards/card-1?"));
    assert!(seen[1].ends_with(r#"{"idList":"list-closed"}"#));
}
