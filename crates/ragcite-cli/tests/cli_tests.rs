//! CLI integration tests

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
    config: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("config.yml");
        let data_dir = dir.path().join("data");
        std::fs::write(
            &config,
            format!(
                "storage:\n  data_dir: {}\n\
                 llm:\n  url: http://127.0.0.1:9\n  timeout_secs: 2\n\
                 retry:\n  max_attempts: 2\n  backoff_base_seconds: 0.0\n\
                 eval:\n  latency_regression_ratio: 1000.0\n",
                data_dir.display()
            ),
        )
        .unwrap();

        let docs = dir.path().join("docs");
        std::fs::create_dir_all(docs.join("science")).unwrap();
        std::fs::write(docs.join("france.txt"), "Paris is the capital of France.").unwrap();
        std::fs::write(
            docs.join("germany.txt"),
            "Berlin is the capital of Germany and its largest city.",
        )
        .unwrap();
        std::fs::write(
            docs.join("science/tea.md"),
            "Green tea is brewed from unoxidized leaves of the camellia plant.",
        )
        .unwrap();

        Self { dir, config }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("ragcite").unwrap();
        cmd.env_remove("RAGCITE_CONFIG")
            .env_remove("RAGCITE_LLM_API_KEY")
            .arg("--config")
            .arg(&self.config);
        cmd
    }

    fn ingest_docs(&self) {
        self.cmd()
            .arg("ingest")
            .arg(self.path("docs"))
            .assert()
            .success();
    }

    fn write_test_set(&self) -> PathBuf {
        let path = self.path("test_set.jsonl");
        std::fs::write(
            &path,
            "{\"query_id\": \"q1\", \"query\": \"capital of France\", \"relevant_chunk_ids\": [\"france.txt#0\"]}\n\
             {\"query_id\": \"q2\", \"query\": \"camellia leaves\", \"relevant_chunk_ids\": [\"science/tea.md#0\"]}\n",
        )
        .unwrap();
        path
    }

    fn eval_to(&self, output: &Path) {
        let test_set = self.write_test_set();
        self.cmd()
            .arg("eval")
            .arg(&test_set)
            .arg("--output")
            .arg(output)
            .assert()
            .success();
    }
}

#[test]
fn test_help() {
    Command::cargo_bin("ragcite")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("citations"));
}

#[test]
fn test_ingest_dir_then_ls() {
    let ws = Workspace::new();
    ws.cmd()
        .arg("ingest")
        .arg(ws.path("docs"))
        .assert()
        .success()
        .stdout(predicate::str::contains("created"));

    ws.cmd()
        .arg("ls")
        .assert()
        .success()
        .stdout(predicate::str::contains("france.txt"))
        .stdout(predicate::str::contains("science/tea.md"));
}

#[test]
fn test_reingest_is_unchanged() {
    let ws = Workspace::new();
    ws.ingest_docs();
    ws.cmd()
        .arg("ingest")
        .arg(ws.path("docs/france.txt"))
        .assert()
        .success()
        .stdout(predicate::str::contains("unchanged"));
}

#[test]
fn test_query_degrades_when_llm_unreachable() {
    let ws = Workspace::new();
    ws.ingest_docs();
    ws.cmd()
        .args(["query", "What is the capital of France?"])
        .assert()
        .success()
        .stdout(predicate::str::contains("DEGRADED MODE"))
        .stdout(predicate::str::contains("france.txt"));
}

#[test]
fn test_query_json_degraded_mode() {
    let ws = Workspace::new();
    ws.ingest_docs();
    let out = ws
        .cmd()
        .args(["--format", "json", "query", "capital", "of", "Germany"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let answer: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(answer["mode"], "degraded");
    assert!(!answer["citations"].as_array().unwrap().is_empty());
}

#[test]
fn test_query_before_ingest_is_not_found() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["query", "anything"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_retrieve_only() {
    let ws = Workspace::new();
    ws.ingest_docs();
    ws.cmd()
        .args(["query", "--retrieve-only", "-n", "1", "camellia"])
        .assert()
        .success()
        .stdout(predicate::str::contains("science/tea.md#0"));
}

#[test]
fn test_eval_json_reports_mrr() {
    let ws = Workspace::new();
    ws.ingest_docs();
    let test_set = ws.write_test_set();
    ws.cmd()
        .args(["--format", "json", "eval"])
        .arg(&test_set)
        .args(["-k", "1,3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"mrr\""));
}

#[test]
fn test_eval_against_own_baseline_passes() {
    let ws = Workspace::new();
    ws.ingest_docs();
    let baseline = ws.path("reports/baseline.json");
    ws.eval_to(&baseline);

    ws.cmd()
        .arg("eval")
        .arg(ws.path("test_set.jsonl"))
        .arg("--baseline")
        .arg(&baseline)
        .assert()
        .success()
        .stdout(predicate::str::contains("No regressions"));
}

#[test]
fn test_compare_identical_reports() {
    let ws = Workspace::new();
    ws.ingest_docs();
    let report = ws.path("report.json");
    ws.eval_to(&report);

    ws.cmd()
        .arg("compare")
        .arg(&report)
        .arg(&report)
        .assert()
        .success();
}

#[test]
fn test_compare_detects_regression() {
    let ws = Workspace::new();
    ws.ingest_docs();
    let current = ws.path("current.json");
    ws.eval_to(&current);

    let mut doctored: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&current).unwrap()).unwrap();
    let mrr = doctored["mrr"].as_f64().unwrap();
    doctored["mrr"] = serde_json::json!(mrr + 0.5);
    let baseline = ws.path("baseline.json");
    std::fs::write(&baseline, serde_json::to_string(&doctored).unwrap()).unwrap();

    ws.cmd()
        .arg("compare")
        .arg(&baseline)
        .arg(&current)
        .assert()
        .code(4)
        .stdout(predicate::str::contains("mrr"));
}

#[test]
fn test_remove_unknown_document() {
    let ws = Workspace::new();
    ws.cmd().args(["remove", "missing.txt"]).assert().code(2);
}

#[test]
fn test_remove_then_ls() {
    let ws = Workspace::new();
    ws.ingest_docs();
    ws.cmd().args(["rm", "france.txt"]).assert().success();
    ws.cmd()
        .arg("ls")
        .assert()
        .success()
        .stdout(predicate::str::contains("germany.txt"))
        .stdout(predicate::str::contains("france.txt").not());
}

#[test]
fn test_status_json() {
    let ws = Workspace::new();
    ws.ingest_docs();
    ws.cmd()
        .args(["--format", "json", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"documents\": 3"));
}

#[test]
fn test_config_show() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("chunk_size"));
}

#[test]
fn test_config_init_refuses_overwrite() {
    let ws = Workspace::new();
    ws.cmd().args(["config", "init"]).assert().code(3);

    let fresh = ws.path("fresh/config.yml");
    Command::cargo_bin("ragcite")
        .unwrap()
        .env_remove("RAGCITE_CONFIG")
        .arg("--config")
        .arg(&fresh)
        .args(["config", "init"])
        .assert()
        .success();
    assert!(fresh.exists());
}

#[test]
fn test_invalid_config_exit_code() {
    let ws = Workspace::new();
    std::fs::write(
        &ws.config,
        "chunking:\n  chunk_size: 100\n  chunk_overlap: 200\n",
    )
    .unwrap();
    ws.cmd().arg("ls").assert().code(3);
}

#[test]
fn test_query_session_is_recorded() {
    let ws = Workspace::new();
    ws.ingest_docs();
    ws.cmd()
        .args(["query", "--session", "chat", "capital of France"])
        .assert()
        .success();
    ws.cmd()
        .args(["query", "-s", "chat", "and of Germany?"])
        .assert()
        .success();

    ws.cmd()
        .args(["sessions", "ls"])
        .assert()
        .success()
        .stdout(predicate::str::contains("chat (2 turns"));
    ws.cmd()
        .args(["--format", "json", "sessions", "show", "chat"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"question\": \"capital of France\""))
        .stdout(predicate::str::contains("\"mode\": \"degraded\""));

    ws.cmd().args(["sessions", "rm", "chat"]).assert().success();
    ws.cmd().args(["sessions", "show", "chat"]).assert().code(2);
}

#[test]
fn test_blank_session_id_rejected() {
    let ws = Workspace::new();
    ws.ingest_docs();
    ws.cmd()
        .args(["query", "--session", " ", "capital of France"])
        .assert()
        .code(3);
}
