use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use uuid::Uuid;

fn unique_workspace(prefix: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("{prefix}-{}", Uuid::now_v7()));
    std::fs::create_dir_all(&path).expect("workspace should be creatable");
    path
}

fn run_taskmaker(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_taskmaker"))
        .arg("--db")
        .arg(root.join("data/tasks.db"))
        .arg("--config")
        .arg(root.join("config.toml"))
        .args(args)
        .env_remove("TASKMAKER_LOG")
        .output()
        .expect("taskmaker command should run")
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "expected success but failed.\nstdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn assert_failure(output: &Output) {
    assert!(
        !output.status.success(),
        "expected failure but command succeeded.\nstdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn parse_added_id(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .split_whitespace()
        .nth(1)
        .and_then(|token| token.strip_prefix('#'))
        .expect("add output should include the task id")
        .to_string()
}

fn list_json(root: &Path) -> Vec<Value> {
    let output = run_taskmaker(root, &["ls", "--json"]);
    assert_success(&output);
    let value: Value = serde_json::from_slice(&output.stdout).expect("ls --json should be json");
    value.as_array().expect("ls --json should be an array").clone()
}

#[test]
fn fresh_database_lists_the_demo_task() {
    let root = unique_workspace("taskmaker-cli-seed");
    let tasks = list_json(&root);
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["id"], 1);
    assert_eq!(tasks[0]["is_complete"], false);
    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn add_complete_and_delete_round_trip() {
    let root = unique_workspace("taskmaker-cli-dispatch");

    let added = run_taskmaker(&root, &["add", "Buy milk", "--priority", "--due", "2030-01-15"]);
    assert_success(&added);
    let id = parse_added_id(&added);
    assert_eq!(id, "2");

    let shown = run_taskmaker(&root, &["show", &id, "--json"]);
    assert_success(&shown);
    let task: Value = serde_json::from_slice(&shown.stdout).expect("show --json should be json");
    assert_eq!(task["description"], "Buy milk");
    assert_eq!(task["is_priority"], true);

    assert_success(&run_taskmaker(&root, &["done", &id]));
    let tasks = list_json(&root);
    let done = tasks
        .iter()
        .find(|task| task["id"] == 2)
        .expect("added task should be listed");
    assert_eq!(done["is_complete"], true);
    // Completed tasks sort after open ones.
    assert_eq!(tasks.last().expect("non-empty")["id"], 2);

    assert_success(&run_taskmaker(&root, &["undone", &id]));
    assert_success(&run_taskmaker(&root, &["rm", &id]));
    assert_failure(&run_taskmaker(&root, &["show", &id]));
    assert_failure(&run_taskmaker(&root, &["rm", &id]));
    assert_eq!(list_json(&root).len(), 1);

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn invalid_input_fails_without_side_effects() {
    let root = unique_workspace("taskmaker-cli-invalid");

    assert_failure(&run_taskmaker(&root, &["add", "   "]));
    assert_failure(&run_taskmaker(&root, &["add", "Bad date", "--due", "tomorrow"]));
    assert_failure(&run_taskmaker(&root, &["done", "99"]));
    assert_failure(&run_taskmaker(&root, &["remind", "1", "--date", "2000-01-01"]));
    assert_failure(&run_taskmaker(&root, &["ls", "--sort", "sideways"]));
    assert_eq!(list_json(&root).len(), 1);

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn sort_preference_persists_in_config() {
    let root = unique_workspace("taskmaker-cli-config");

    assert_success(&run_taskmaker(&root, &["config", "sort", "date"]));
    let shown = run_taskmaker(&root, &["config", "show"]);
    assert_success(&shown);
    assert!(String::from_utf8_lossy(&shown.stdout).contains("sort_order = \"date\""));

    let listed = run_taskmaker(&root, &["ls"]);
    assert_success(&listed);
    assert!(String::from_utf8_lossy(&listed.stdout).contains("sort: date"));

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn clear_completed_and_cleanup_report_counts() {
    let root = unique_workspace("taskmaker-cli-clear");

    let added = run_taskmaker(&root, &["add", "Water plants"]);
    assert_success(&added);
    let id = parse_added_id(&added);
    assert_success(&run_taskmaker(&root, &["done", &id]));

    let cleared = run_taskmaker(&root, &["clear", "--completed"]);
    assert_success(&cleared);
    assert!(String::from_utf8_lossy(&cleared.stdout).contains("deleted 1 task(s)"));

    let cleanup = run_taskmaker(&root, &["cleanup"]);
    assert_success(&cleanup);
    assert!(String::from_utf8_lossy(&cleanup.stdout).contains("purged 0 stale task(s)"));

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn remind_and_bounded_run_succeed() {
    let root = unique_workspace("taskmaker-cli-remind");

    let reminded = run_taskmaker(&root, &["remind", "1", "--date", "2099-06-01"]);
    assert_success(&reminded);
    assert!(String::from_utf8_lossy(&reminded.stdout).contains("2099-06-01T12:00:00Z"));

    let ran = run_taskmaker(&root, &["run", "--seconds", "0", "--tick-ms", "10"]);
    assert_success(&ran);
    let stdout = String::from_utf8_lossy(&ran.stdout);
    assert!(stdout.contains("watching 1 pending reminder(s)"));
    assert!(stdout.contains("fired 0 reminder(s)"));

    let _ = std::fs::remove_dir_all(root);
}
