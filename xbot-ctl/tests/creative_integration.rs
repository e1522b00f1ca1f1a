//! Integration tests for xbot-ctl creative commands

use assert_cmd::Command;
use libxbot::{Database, Post, ReplyLedger, ReplyRecord, ReplyStatus};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to escape path for TOML on Windows
fn escape_path_for_toml(path: &str) -> String {
    path.replace('\\', "\\\\")
}

/// Config and database in a temp dir. Platform credentials are left empty:
/// management commands must not need them.
fn setup_test_env() -> (TempDir, String) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("data").join("xbot.db");

    let config_content = format!(
        r#"
[database]
path = "{}"

[platform]

[classifier]
model = "test-model"
"#,
        escape_path_for_toml(&db_path.to_string_lossy())
    );
    fs::write(&config_path, config_content).unwrap();

    (temp_dir, config_path.to_string_lossy().to_string())
}

fn ctl(config_path: &str) -> Command {
    let mut cmd = Command::cargo_bin("xbot-ctl").unwrap();
    cmd.env("XBOT_CONFIG", config_path).env_remove("XBOT_DB_PATH");
    cmd
}

#[test]
fn test_creative_add_then_list() {
    let (_temp_dir, config_path) = setup_test_env();

    ctl(&config_path)
        .args(["creative", "add", "--name", "launch", "--content", "Join our hackathon!"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created creative 1 (launch)"));

    ctl(&config_path)
        .args(["creative", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 | active | hackathon | priority 0 | used 0 | launch"));
}

#[test]
fn test_creative_list_json() {
    let (_temp_dir, config_path) = setup_test_env();

    ctl(&config_path)
        .args(["creative", "add", "--name", "a", "--content", "A", "--priority", "5"])
        .assert()
        .success();
    ctl(&config_path)
        .args(["creative", "add", "--name", "b", "--content", "B", "--category", "meetup"])
        .assert()
        .success();

    let output = ctl(&config_path)
        .args(["creative", "list", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let creatives: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let creatives = creatives.as_array().unwrap();
    assert_eq!(creatives.len(), 2);
    assert_eq!(creatives[0]["name"], "a");
    assert_eq!(creatives[0]["priority"], 5);
    assert_eq!(creatives[1]["category"], "meetup");
}

#[test]
fn test_creative_list_filters_by_category() {
    let (_temp_dir, config_path) = setup_test_env();

    ctl(&config_path)
        .args(["creative", "add", "--name", "a", "--content", "A"])
        .assert()
        .success();
    ctl(&config_path)
        .args(["creative", "add", "--name", "b", "--content", "B", "--category", "meetup"])
        .assert()
        .success();

    ctl(&config_path)
        .args(["creative", "list", "--category", "meetup"])
        .assert()
        .success()
        .stdout(predicate::str::contains("used 0 | b\n"))
        .stdout(predicate::str::contains("used 0 | a\n").not());
}

#[test]
fn test_creative_disable_and_enable() {
    let (_temp_dir, config_path) = setup_test_env();

    ctl(&config_path)
        .args(["creative", "add", "--name", "launch", "--content", "Join!"])
        .assert()
        .success();

    ctl(&config_path)
        .args(["creative", "disable", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Creative 1 disabled"));

    ctl(&config_path)
        .args(["creative", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 | inactive"));

    ctl(&config_path)
        .args(["creative", "enable", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Creative 1 enabled"));
}

#[test]
fn test_creative_disable_unknown_id_is_invalid_input() {
    let (_temp_dir, config_path) = setup_test_env();

    ctl(&config_path)
        .args(["creative", "disable", "42"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("creative 42"));
}

#[test]
fn test_creative_update_then_show() {
    let (_temp_dir, config_path) = setup_test_env();

    ctl(&config_path)
        .args(["creative", "add", "--name", "launch", "--content", "Old", "--priority", "4"])
        .assert()
        .success();

    ctl(&config_path)
        .args(["creative", "update", "1", "--content", "Registration closes Friday!"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated creative 1 (launch)"));

    ctl(&config_path)
        .args(["creative", "show", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 | active | hackathon | priority 4 | used 0 | launch"))
        .stdout(predicate::str::contains("Registration closes Friday!"));

    let output = ctl(&config_path)
        .args(["creative", "show", "1", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let creative: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(creative["content"], "Registration closes Friday!");
    assert_eq!(creative["priority"], 4);
}

#[test]
fn test_creative_update_without_fields_is_invalid_input() {
    let (_temp_dir, config_path) = setup_test_env();

    ctl(&config_path)
        .args(["creative", "add", "--name", "launch", "--content", "Join!"])
        .assert()
        .success();

    ctl(&config_path)
        .args(["creative", "update", "1"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("nothing to update"));
}

#[test]
fn test_creative_show_unknown_id() {
    let (_temp_dir, config_path) = setup_test_env();

    ctl(&config_path)
        .args(["creative", "show", "7"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("creative 7"));
}

#[test]
fn test_creative_remove() {
    let (_temp_dir, config_path) = setup_test_env();

    ctl(&config_path)
        .args(["creative", "add", "--name", "launch", "--content", "Join!"])
        .assert()
        .success();

    ctl(&config_path)
        .args(["creative", "remove", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Creative 1 removed"));

    ctl(&config_path)
        .args(["creative", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("launch").not());

    ctl(&config_path)
        .args(["creative", "remove", "1"])
        .assert()
        .failure()
        .code(3);
}

#[tokio::test]
async fn test_creative_remove_refuses_used_creative() {
    let (temp_dir, config_path) = setup_test_env();

    ctl(&config_path)
        .args(["creative", "add", "--name", "launch", "--content", "Join!"])
        .assert()
        .success();

    let db_path = temp_dir.path().join("data").join("xbot.db");
    let db = Database::new(&db_path.to_string_lossy()).await.unwrap();
    let post = Post {
        id: "500".to_string(),
        author_id: "7".to_string(),
        text: "hackathon this weekend".to_string(),
        created_at: None,
    };
    let mut record = ReplyRecord::for_post(&post, ReplyStatus::Success);
    record.creative_id = Some(1);
    db.save(&record).await.unwrap();

    ctl(&config_path)
        .args(["creative", "remove", "1"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("disable it instead"));

    ctl(&config_path)
        .args(["creative", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("| launch"));
}

#[test]
fn test_creative_add_rejects_blank_content() {
    let (_temp_dir, config_path) = setup_test_env();

    ctl(&config_path)
        .args(["creative", "add", "--name", "empty", "--content", "  "])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("content cannot be empty"));
}

#[test]
fn test_invalid_format_is_rejected() {
    let (_temp_dir, config_path) = setup_test_env();

    ctl(&config_path)
        .args(["creative", "list", "--format", "yaml"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Invalid format 'yaml'"));
}

#[test]
fn test_missing_config_file_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.toml");

    ctl(&missing.to_string_lossy())
        .args(["creative", "list"])
        .assert()
        .failure()
        .code(2);
}
