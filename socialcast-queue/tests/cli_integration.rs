//! Integration tests for socialcast-queue

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to escape path for TOML on Windows
fn escape_path_for_toml(path: &str) -> String {
    path.replace('\\', "\\\\")
}

/// Write a config keeping the database and scratch storage inside `temp_dir`
fn setup_test_env() -> (TempDir, String) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("data").join("socialcast.db");
    let scratch = temp_dir.path().join("scratch");

    let config_content = format!(
        r#"
[database]
path = "{}"

[storage]
temp_dir = "{}"
"#,
        escape_path_for_toml(&db_path.to_string_lossy()),
        escape_path_for_toml(&scratch.to_string_lossy())
    );
    fs::write(&config_path, config_content).unwrap();

    (temp_dir, config_path.to_string_lossy().to_string())
}

fn queue(config_path: &str) -> Command {
    let mut cmd = Command::cargo_bin("socialcast-queue").unwrap();
    cmd.env("SOCIALCAST_CONFIG", config_path)
        .env_remove("SOCIALCAST_DB_PATH")
        .env_remove("SOCIALCAST_ACCOUNT")
        .env_remove("SOCIALCAST_ACCESS_TOKEN")
        .env_remove("RUST_LOG");
    cmd
}

fn create_account(config_path: &str, name: &str) {
    queue(config_path)
        .args(["account", "create", name])
        .assert()
        .success()
        .stdout(predicate::str::contains(name));
}

/// Run `create` and return the new post id (first stdout line)
fn create_post(config_path: &str, args: &[&str]) -> String {
    let output = queue(config_path)
        .args(["--account", "brand", "create"])
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    String::from_utf8(output)
        .unwrap()
        .lines()
        .next()
        .unwrap()
        .trim()
        .to_string()
}

fn list_json(config_path: &str, extra: &[&str]) -> Vec<serde_json::Value> {
    let output = queue(config_path)
        .args(["--account", "brand", "--format", "json", "list"])
        .args(extra)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).unwrap()
}

#[test]
fn test_account_create_rejects_duplicates() {
    let (_temp, config) = setup_test_env();
    create_account(&config, "brand");

    queue(&config)
        .args(["account", "create", "brand"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_create_then_approve_scheduled_post() {
    let (_temp, config) = setup_test_env();
    create_account(&config, "brand");

    let post_id = create_post(&config, &["Launch day", "-p", "facebook", "--schedule", "2h"]);

    let pending = list_json(&config, &["--status", "pending_approval"]);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["id"], post_id.as_str());
    assert_eq!(pending[0]["status"], "pending_approval");

    queue(&config)
        .args(["--account", "brand", "approve", &post_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("scheduled for"));

    let approved = list_json(&config, &["--status", "approved"]);
    assert_eq!(approved.len(), 1);
    assert!(list_json(&config, &["--status", "pending_approval"]).is_empty());
}

#[test]
fn test_second_approval_is_rejected() {
    let (_temp, config) = setup_test_env();
    create_account(&config, "brand");
    let post_id = create_post(&config, &["later", "-p", "facebook", "--schedule", "1 day"]);

    queue(&config)
        .args(["--account", "brand", "approve", &post_id])
        .assert()
        .success();

    queue(&config)
        .args(["--account", "brand", "approve", &post_id])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Post already processed"));
}

#[test]
fn test_approve_unknown_post_is_not_found() {
    let (_temp, config) = setup_test_env();
    create_account(&config, "brand");

    queue(&config)
        .args(["--account", "brand", "approve", "no-such-post"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Not found"));
}

#[test]
fn test_immediate_publication_failing_everywhere_exits_1() {
    let (_temp, config) = setup_test_env();
    create_account(&config, "brand");

    let assert = queue(&config)
        .args(["--account", "brand", "create", "now", "-p", "unsupported_x", "--approve"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("unsupported_x: failed: Unsupported platform"));

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let post_id = stdout.lines().next().unwrap().trim().to_string();

    queue(&config)
        .args(["--format", "json", "show", &post_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"failed\""));
}

#[test]
fn test_bad_schedule_is_invalid_input() {
    let (_temp, config) = setup_test_env();
    create_account(&config, "brand");

    queue(&config)
        .args(["--account", "brand", "create", "x", "-p", "facebook", "--schedule", "not a time"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Could not parse schedule string"));
}

#[test]
fn test_commands_need_an_account() {
    let (_temp, config) = setup_test_env();

    queue(&config)
        .args(["create", "hello", "-p", "facebook"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("needs an account"));

    queue(&config)
        .args(["--account", "ghost", "key", "stats"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Account 'ghost'"));
}

#[test]
fn test_connect_and_platform_status() {
    let (_temp, config) = setup_test_env();
    create_account(&config, "brand");

    // Facebook needs a page id
    queue(&config)
        .args(["--account", "brand", "connect", "facebook", "--token", "fb"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("require a target id"));

    queue(&config)
        .args(["--account", "brand", "connect", "tiktok"])
        .env("SOCIALCAST_ACCESS_TOKEN", "tt-token")
        .assert()
        .success()
        .stdout(predicate::str::contains("Connected TikTok"));

    queue(&config)
        .args(["--account", "brand", "platforms"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tiktok | TikTok | connected"))
        .stdout(predicate::str::contains("facebook | Facebook | not connected"));

    queue(&config)
        .args(["--account", "brand", "disconnect", "tiktok"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Disconnected TikTok"));

    queue(&config)
        .args(["--account", "brand", "connect", "myspace", "--token", "x"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Unsupported platform 'myspace'"));
}

#[test]
fn test_platforms_without_account_lists_supported_set() {
    let (_temp, config) = setup_test_env();

    let output = queue(&config)
        .args(["--format", "json", "platforms"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let platforms: Vec<serde_json::Value> = serde_json::from_slice(&output).unwrap();
    let names: Vec<&str> = platforms.iter().map(|p| p["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["facebook", "instagram", "tiktok", "youtube"]);
    assert!(platforms[0].get("connected").is_none());
}

#[test]
fn test_api_key_lifecycle() {
    let (_temp, config) = setup_test_env();
    create_account(&config, "brand");

    queue(&config)
        .args(["--account", "brand", "key", "generate", "--name", "ci"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("sc_"));

    let output = queue(&config)
        .args(["--account", "brand", "--format", "json", "key", "stats"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stats: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(stats["active"], true);
    assert_eq!(stats["name"], "ci");
    assert_eq!(stats["total_usage"], 0);

    queue(&config)
        .args(["--account", "brand", "key", "revoke"])
        .assert()
        .success();

    queue(&config)
        .args(["--account", "brand", "key", "revoke"])
        .assert()
        .code(3);

    queue(&config)
        .args(["--account", "brand", "key", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("active:        false"));
}

#[test]
fn test_files_commands_on_empty_store() {
    let (_temp, config) = setup_test_env();

    queue(&config)
        .args(["--format", "json", "files", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"count\": 0"));

    queue(&config)
        .args(["files", "sweep"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 0 file(s)"));
}

#[test]
fn test_invalid_format() {
    let (_temp, config) = setup_test_env();

    queue(&config)
        .args(["--format", "yaml", "files", "stats"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Invalid format 'yaml'"));
}
