use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn evh_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("evh");
    path
}

/// Temp workspace with a config pointing the cache at `data/` and the
/// embedder at `provider`.
fn setup_test_env(provider: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let notes = root.join("notes");
    fs::create_dir_all(&notes).unwrap();
    fs::write(notes.join("short.md"), "# Short\n\nToo short to chunk.").unwrap();
    fs::write(notes.join("blank.txt"), "").unwrap();

    let config_content = format!(
        r#"[retrieval]
top_k = 3

[search]
endpoint = "http://127.0.0.1:9/search"

[cache]
backend = "sqlite"
path = "{}/data/cache.sqlite"
collection = "cli_test"

[embedding]
provider = "{}"
model = "bge-m3"
dims = 8
"#,
        root.display(),
        provider
    );

    let config_path = config_dir.join("evh.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_evh(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = evh_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run evh binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn parse(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout).unwrap_or_else(|e| panic!("not JSON ({}): {}", e, stdout))
}

#[test]
fn test_init_creates_collection() {
    let (tmp, config_path) = setup_test_env("ollama");

    let (stdout, stderr, success) = run_evh(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    let out = parse(&stdout);
    assert_eq!(out["backend"], "sqlite");
    assert_eq!(out["collection"], "cli_test");
    assert_eq!(out["chunks"], 0);
    assert!(tmp.path().join("data/cache.sqlite").exists());

    // idempotent
    let (_, _, success) = run_evh(&config_path, &["init"]);
    assert!(success, "second init failed");
}

#[test]
fn test_cache_stats_when_disabled() {
    let (_tmp, config_path) = setup_test_env("disabled");

    let (stdout, stderr, success) = run_evh(&config_path, &["cache", "stats"]);
    assert!(success, "stats failed: {}", stderr);
    let out = parse(&stdout);
    assert_eq!(out["enabled"], false);
    assert_eq!(out["backend"], "sqlite");
}

#[test]
fn test_init_fails_when_cache_disabled() {
    let (_tmp, config_path) = setup_test_env("disabled");

    let (_, stderr, success) = run_evh(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "stderr: {}", stderr);
}

#[test]
fn test_retrieve_empty_prompt_prints_error_document() {
    let (_tmp, config_path) = setup_test_env("disabled");

    let (stdout, stderr, success) = run_evh(&config_path, &["retrieve", ""]);
    assert!(success, "retrieve failed: {}", stderr);
    let out = parse(&stdout);
    assert_eq!(out["error"]["code"], "invalid_input");
    assert!(out["example"]["claim"].is_string());
}

#[test]
fn test_ingest_reports_short_and_blank_files() {
    let (tmp, config_path) = setup_test_env("ollama");
    let notes = tmp.path().join("notes");

    let (stdout, stderr, success) = run_evh(&config_path, &["ingest", notes.to_str().unwrap()]);
    assert!(success, "ingest failed: {}", stderr);
    let out = parse(&stdout);
    assert_eq!(out["files_seen"], 2);
    assert_eq!(out["empty"], 1);
    assert_eq!(out["chunks_written"], 0);
    assert_eq!(out["failed"].as_array().unwrap().len(), 1);
}

#[test]
fn test_invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("bad.toml");
    fs::write(&config_path, "[cache]\nbackend = \"cassandra\"\n").unwrap();

    let (_, _, success) = run_evh(&config_path, &["cache", "stats"]);
    assert!(!success);
}
