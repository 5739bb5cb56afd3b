// Pre-commit safety gates.
//
// `validate` is fail-closed: any violation aborts the cycle before anything is
// staged. `check_team` handles remote divergence before committing.

pub mod secrets;

use std::time::Duration;

use autopilot_common::types::ChangedFile;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::{ConflictStrategy, EffectiveConfig};
use crate::events::{EventKind, EventLog};
use crate::git::worker::{CommandExecutor, GitWorker, GitWorkerError};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Outcome of `SafetyPipeline::validate`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SafetyReport {
    pub violations: Vec<String>,
}

impl SafetyReport {
    pub fn ok(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Outcome of the team-mode remote check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeamOutcome {
    Continue,
    /// Skip this cycle and try again on the next one.
    Skip(String),
    /// Stop all cycles until resumed.
    Pause(String),
}

pub struct SafetyPipeline<'a, E> {
    git: &'a GitWorker<E>,
    config: &'a EffectiveConfig,
    events: Option<&'a EventLog>,
}

impl<'a, E: CommandExecutor> SafetyPipeline<'a, E> {
    pub fn new(git: &'a GitWorker<E>, config: &'a EffectiveConfig) -> Self {
        Self { git, config, events: None }
    }

    pub fn with_events(mut self, events: &'a EventLog) -> Self {
        self.events = Some(events);
        self
    }

    /// Run every enabled gate over `files`. A merge or rebase in progress is
    /// reported on its own and cannot be disabled.
    pub async fn validate(&self, files: &[ChangedFile]) -> SafetyReport {
        match self.git.in_progress_operation().await {
            Ok(Some(operation)) => {
                return SafetyReport {
                    violations: vec![format!("Repository is in the middle of a {operation}")],
                }
            }
            Ok(None) => {}
            Err(error) => {
                return SafetyReport {
                    violations: vec![format!("Could not inspect repository state: {error}")],
                }
            }
        }

        let present: Vec<&ChangedFile> = files.iter().filter(|file| !file.status.is_deleted()).collect();
        let gates = &self.config.pre_commit_checks;
        let mut violations = Vec::new();

        if gates.file_size {
            violations.extend(self.check_sizes(&present).await);
        }
        if gates.secrets {
            violations.extend(self.check_secrets(&present).await);
        }
        for command in self.config.check_commands() {
            if let Some(violation) = self.run_check(&command).await {
                violations.push(violation);
            }
        }

        if !violations.is_empty() {
            warn!(count = violations.len(), "safety checks failed");
        }
        SafetyReport { violations }
    }

    async fn check_sizes(&self, files: &[&ChangedFile]) -> Vec<String> {
        let limit = self.config.max_file_size_bytes;
        let mut violations = Vec::new();
        for file in files {
            let path = self.git.repo_path().join(&file.path);
            match tokio::fs::metadata(&path).await {
                Ok(metadata) if metadata.is_file() && metadata.len() > limit => {
                    violations.push(format!(
                        "File {} is too large ({:.2}MB > {:.2}MB)",
                        file.path,
                        metadata.len() as f64 / BYTES_PER_MB,
                        limit as f64 / BYTES_PER_MB
                    ));
                }
                Ok(_) => {}
                Err(error) => debug!(path = %file.path, error = %error, "skipping size check"),
            }
        }
        violations
    }

    async fn check_secrets(&self, files: &[&ChangedFile]) -> Vec<String> {
        let mut violations = Vec::new();
        for file in files {
            let path = self.git.repo_path().join(&file.path);
            if !path.is_file() {
                continue;
            }
            match secrets::scan_file(&path).await {
                Ok(found) => violations.extend(
                    found.into_iter().map(|name| format!("Possible {name} detected in {}", file.path)),
                ),
                Err(error) => debug!(path = %file.path, error = %error, "could not read file for secret scan"),
            }
        }
        violations
    }

    async fn run_check(&self, command: &str) -> Option<String> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        let program_args: Vec<String> = parts.collect();
        let timeout = Duration::from_secs(self.config.timeouts.check_seconds);

        info!(%command, "running pre-commit check");
        match self.git.run_program(&program, &program_args, timeout).await {
            Ok(_) => None,
            Err(GitWorkerError::TimedOut { after, .. }) => {
                Some(format!("Check `{command}` timed out after {}s", after.as_secs()))
            }
            Err(GitWorkerError::CommandFailed { code, stderr, .. }) => {
                let detail = stderr.lines().find(|line| !line.trim().is_empty()).unwrap_or("").trim();
                Some(format!("Check `{command}` failed (exit {}): {detail}", exit_label(code)))
            }
            Err(error) => Some(format!("Check `{command}` could not run: {error}")),
        }
    }

    /// Compare with the remote before committing. Only active in team mode.
    pub async fn check_team(&self, branch: &str) -> TeamOutcome {
        if !self.config.team_mode {
            return TeamOutcome::Continue;
        }
        let remote = self.config.remote.as_str();

        match self.git.unpushed_count(remote, branch).await {
            Ok(count) if count > self.config.max_unpushed_commits => {
                warn!(count, limit = self.config.max_unpushed_commits, "too many unpushed commits");
                self.record(
                    EventKind::UnpushedLimit,
                    json!({ "count": count, "limit": self.config.max_unpushed_commits }),
                );
            }
            Ok(_) => {}
            Err(error) => debug!(error = %error, "could not count unpushed commits"),
        }

        if let Err(error) = self.git.fetch(remote).await {
            return TeamOutcome::Skip(format!("fetch from {remote} failed: {error}"));
        }

        let behind = match self.git.ahead_behind(remote, branch).await {
            Ok((_, behind)) => behind,
            Err(error) => {
                // No upstream branch yet.
                debug!(error = %error, "no remote tracking counts, continuing");
                return TeamOutcome::Continue;
            }
        };
        if behind == 0 {
            return TeamOutcome::Continue;
        }

        if !self.config.pull_before_push {
            return TeamOutcome::Skip(format!("{remote}/{branch} is {behind} commit(s) ahead"));
        }

        info!(behind, "remote is ahead, rebasing before commit");
        let Err(error) = self.git.pull_rebase(remote, branch).await else {
            return TeamOutcome::Continue;
        };

        if let Err(abort_error) = self.git.rebase_abort().await {
            debug!(error = %abort_error, "rebase --abort failed");
        }
        let reason = format!("pull --rebase from {remote}/{branch} failed: {error}");
        self.record(EventKind::RemoteConflict, json!({ "branch": branch, "reason": reason }));

        match self.config.conflict_strategy {
            ConflictStrategy::Pause => TeamOutcome::Pause(reason),
            ConflictStrategy::Abort => TeamOutcome::Skip(reason),
        }
    }

    fn record(&self, kind: EventKind, fields: serde_json::Value) {
        if let Some(events) = self.events {
            events.record(kind, fields);
        }
    }
}

fn exit_label(code: Option<i32>) -> String {
    code.map(|code| code.to_string()).unwrap_or_else(|| "signal".to_string())
}
