use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

struct Sandbox {
    temp: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let temp = TempDir::new().expect("tempdir should be created");
        std::fs::create_dir_all(temp.path().join("global")).unwrap();
        Self { temp }
    }

    fn repo(&self) -> std::path::PathBuf {
        let repo = self.temp.path().join("repo");
        if !repo.exists() {
            git(self.temp.path(), &["init", "-q", "-b", "feature", "repo"]);
            git(&repo, &["config", "user.name", "Autopilot Test"]);
            git(&repo, &["config", "user.email", "autopilot@example.test"]);
            std::fs::write(repo.join("README.md"), "# Demo\n").unwrap();
            git(&repo, &["add", "."]);
            git(&repo, &["commit", "-q", "-m", "seed"]);
        }
        repo
    }

    fn autopilot(&self, cwd: &Path, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_autopilot"))
            .args(&args[..1])
            .arg("--json")
            .args(&args[1..])
            .current_dir(cwd)
            .env("AUTOPILOT_CONFIG_DIR", self.temp.path().join("global"))
            .env("RUST_LOG", "off")
            .output()
            .expect("autopilot binary should run")
    }
}

fn git(cwd: &Path, args: &[&str]) {
    let status = Command::new("git").args(args).current_dir(cwd).status().expect("git should run");
    assert!(status.success(), "git {args:?} failed");
}

fn json_stdout(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "command failed ({:?}): {}",
        output.status.code(),
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

fn error_code(output: &Output) -> String {
    let error: Value = serde_json::from_slice(&output.stderr).expect("stderr should be JSON");
    error["error"]["code"].as_str().unwrap_or_default().to_string()
}

#[test]
fn init_creates_files_and_is_idempotent() {
    let sandbox = Sandbox::new();
    let repo = sandbox.repo();

    let first = json_stdout(&sandbox.autopilot(&repo, &["init"]));
    assert_eq!(first["configCreated"], true);
    assert_eq!(first["ignoreCreated"], true);
    assert!(repo.join(".autopilotrc.json").exists());
    assert!(repo.join(".autopilotignore").exists());
    let exclude = std::fs::read_to_string(repo.join(".git/info/exclude")).unwrap();
    assert!(exclude.lines().any(|line| line.trim() == ".autopilot/"));

    let second = json_stdout(&sandbox.autopilot(&repo, &["init"]));
    assert_eq!(second["configCreated"], false);
    assert_eq!(second["ignoreCreated"], false);
}

#[test]
fn status_outside_a_repository_exits_with_repository_code() {
    let sandbox = Sandbox::new();
    let plain = sandbox.temp.path().join("plain");
    std::fs::create_dir_all(&plain).unwrap();

    let output = sandbox.autopilot(&plain, &["status"]);
    assert_eq!(output.status.code(), Some(11));
    assert_eq!(error_code(&output), "NOT_A_REPOSITORY");
}

#[test]
fn pause_resume_and_status_round_trip() {
    let sandbox = Sandbox::new();
    let repo = sandbox.repo();

    let status = json_stdout(&sandbox.autopilot(&repo, &["status"]));
    assert_eq!(status["running"], false);
    assert_eq!(status["paused"], false);

    let paused = json_stdout(&sandbox.autopilot(&repo, &["pause", "pairing", "session"]));
    assert_eq!(paused["reason"], "pairing session");

    let status = json_stdout(&sandbox.autopilot(&repo, &["status"]));
    assert_eq!(status["paused"], true);
    assert_eq!(status["pauseReason"], "pairing session");

    json_stdout(&sandbox.autopilot(&repo, &["resume"]));
    let status = json_stdout(&sandbox.autopilot(&repo, &["status"]));
    assert_eq!(status["paused"], false);
}

#[test]
fn stop_without_daemon_exits_not_running() {
    let sandbox = Sandbox::new();
    let repo = sandbox.repo();

    let output = sandbox.autopilot(&repo, &["stop"]);
    assert_eq!(output.status.code(), Some(12));
    assert_eq!(error_code(&output), "NOT_RUNNING");
}

#[test]
fn config_set_get_and_global_scope() {
    let sandbox = Sandbox::new();
    let repo = sandbox.repo();

    let set = json_stdout(&sandbox.autopilot(&repo, &["config", "set", "debounceSeconds", "45"]));
    assert_eq!(set["value"], 45);
    let get = json_stdout(&sandbox.autopilot(&repo, &["config", "get", "debounceSeconds"]));
    assert_eq!(get["value"], 45);

    json_stdout(&sandbox.autopilot(&repo, &["config", "set", "--global", "remote", "upstream"]));
    let global = std::fs::read_to_string(sandbox.temp.path().join("global/config.json")).unwrap();
    assert!(global.contains("upstream"));
    let get = json_stdout(&sandbox.autopilot(&repo, &["config", "get", "remote"]));
    assert_eq!(get["value"], "upstream");
}

#[test]
fn invalid_config_exits_with_config_code() {
    let sandbox = Sandbox::new();
    let repo = sandbox.repo();
    std::fs::write(repo.join(".autopilotrc.json"), "{ not json").unwrap();

    let output = sandbox.autopilot(&repo, &["config", "list"]);
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(error_code(&output), "CONFIG_INVALID");
}

#[test]
fn preset_apply_merges_and_unknown_preset_is_usage_error() {
    let sandbox = Sandbox::new();
    let repo = sandbox.repo();

    let listed = json_stdout(&sandbox.autopilot(&repo, &["preset", "list"]));
    let names: Vec<&str> = listed.as_array().unwrap().iter().filter_map(|p| p["name"].as_str()).collect();
    assert!(names.contains(&"safe-team"));

    let applied = json_stdout(&sandbox.autopilot(&repo, &["preset", "apply", "safe-team"]));
    assert_eq!(applied["applied"], "safe-team");
    let local = std::fs::read_to_string(repo.join(".autopilotrc.json")).unwrap();
    assert!(local.contains("teamMode"));

    let output = sandbox.autopilot(&repo, &["preset", "apply", "nope"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn undo_with_empty_ledger_reports_nothing_and_zero_count_is_usage_error() {
    let sandbox = Sandbox::new();
    let repo = sandbox.repo();

    let output = sandbox.autopilot(&repo, &["undo", "--count", "0"]);
    assert_eq!(output.status.code(), Some(2));

    let result = json_stdout(&sandbox.autopilot(&repo, &["undo"]));
    assert_eq!(result["undone"].as_array().map(Vec::len), Some(0));
}
