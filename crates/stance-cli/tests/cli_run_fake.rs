#![allow(deprecated)]
//! End-to-end CLI contract over an offline (fake) chain.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

const CHAIN: &str = r#"
version: 1
labels: [for, against, neutral]
links:
  - model: fake-small
    strategy: fake
    threshold: 0.5
  - model: fake-large
    strategy: fake
filters: [0.0, 0.0]
"#;

const INPUT: &str = r#"{"id": "r1", "Tweet": "Solar panels on every roof!", "Target": "renewable energy"}
{"id": "r2", "Tweet": "Coal keeps the lights on.", "Target": "renewable energy"}

{"id": "r3", "text": "Not sure what to think.", "target": "renewable energy"}
"#;

fn stance() -> Command {
    Command::cargo_bin("stance").unwrap()
}

fn write(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
    let p = dir.join(name);
    std::fs::write(&p, body).unwrap();
    p
}

fn run_batch(dir: &Path) -> (String, Vec<serde_json::Value>) {
    let config = write(dir, "chain.yaml", CHAIN);
    let input = write(dir, "in.jsonl", INPUT);
    let output = dir.join("out.jsonl");
    let db = dir.join("db").join("results.db");

    let out = stance()
        .args(["run", "--config"])
        .arg(&config)
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .arg("--db")
        .arg(&db)
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "run failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let batch_id = String::from_utf8_lossy(&out.stdout).trim().to_string();
    let rows = std::fs::read_to_string(&output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    (batch_id, rows)
}

#[test]
fn run_annotates_every_row_and_prints_batch_id() {
    let dir = tempfile::tempdir().unwrap();
    let (batch_id, rows) = run_batch(dir.path());

    assert_eq!(batch_id.len(), 36, "expected a uuid, got {batch_id:?}");
    assert_eq!(rows.len(), 3);
    let ids: Vec<&str> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["r1", "r2", "r3"]);
    for r in &rows {
        let label = r["pred_label"].as_str().unwrap();
        assert!(["for", "against", "neutral"].contains(&label));
        assert_eq!(r["raw_pred_label"].as_str().unwrap(), label.to_uppercase());
        assert!(r["conf_score"].as_f64().unwrap() > 0.0);
        assert_eq!(r["label_logprobs"].as_object().unwrap().len(), 3);
        assert!(r["resolved_at"].as_u64().unwrap() <= 1);
    }
}

#[test]
fn batches_and_export_read_the_store_back() {
    let dir = tempfile::tempdir().unwrap();
    let (batch_id, _) = run_batch(dir.path());
    let db = dir.path().join("db").join("results.db");

    stance()
        .args(["batches", "--db"])
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains(batch_id.as_str()))
        .stdout(predicate::str::contains("completed"))
        .stdout(predicate::str::contains("fake-small -> fake-large"));

    let out = stance()
        .args(["export", "--db"])
        .arg(&db)
        .args(["--batch", batch_id.as_str(), "--link", "0"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let exported: Vec<serde_json::Value> = String::from_utf8_lossy(&out.stdout)
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(exported.len(), 3);
    assert_eq!(exported[0]["model"], "fake-small");
    assert_eq!(exported[2]["record_index"], 2);

    stance()
        .args(["export", "--db"])
        .arg(&db)
        .args(["--batch", "no-such-batch", "--link", "0"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("unknown batch"));
}

#[test]
fn invalid_config_exits_with_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(
        dir.path(),
        "chain.yaml",
        "version: 1\nlinks:\n  - model: a\n    strategy: fake\n  - model: b\n    strategy: fake\n",
    );
    stance()
        .args(["validate", "--config"])
        .arg(&config)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("only the last link"));
}

#[test]
fn validate_lists_links() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(dir.path(), "chain.yaml", CHAIN);
    stance()
        .args(["validate", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("ok: 2 link(s)"))
        .stdout(predicate::str::contains("[0] fake-small (fake) threshold 0.5"));
}

#[test]
fn malformed_input_exits_with_input_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(dir.path(), "chain.yaml", CHAIN);
    let input = write(dir.path(), "in.jsonl", "{\"target\": \"x\"}\n");
    stance()
        .args(["run", "--config"])
        .arg(&config)
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(dir.path().join("out.jsonl"))
        .arg("--db")
        .arg(dir.path().join("r.db"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("line 1"));
}

#[test]
fn empty_input_completes_an_empty_batch() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(dir.path(), "chain.yaml", CHAIN);
    let input = write(dir.path(), "in.jsonl", "\n  \n");
    let output = dir.path().join("out.jsonl");
    let db = dir.path().join("r.db");
    stance()
        .args(["run", "--config"])
        .arg(&config)
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .arg("--db")
        .arg(&db)
        .assert()
        .success();
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "");

    stance()
        .args(["batches", "--db"])
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("completed"))
        .stdout(predicate::str::contains("0 records"));

    stance()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("empty file yields an empty batch"));
}

#[test]
fn too_many_filters_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(dir.path(), "chain.yaml", CHAIN);
    let input = write(dir.path(), "in.jsonl", INPUT);
    stance()
        .args(["run", "--config"])
        .arg(&config)
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(dir.path().join("out.jsonl"))
        .args(["--filter", "0.1", "--filter", "0.2", "--filter", "0.3"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("3 filters given for 2 links"));
}
