// Control operations behind the CLI: everything except `start` works on
// persisted state, with or without a running daemon.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use autopilot_common::types::{PauseState, SchedulerPhase, StatusSnapshot};
use serde_json::json;
use tracing::{debug, info};

use crate::config::{ConfigStore, EffectiveConfig};
use crate::error::AutopilotError;
use crate::events::{EventKind, EventLog};
use crate::git::undo::{undo as undo_commits, UndoReport};
use crate::git::worker::{CommandExecutor, GitTimeouts, GitWorker};
use crate::ignore::{default_ignore_file, IGNORE_FILE};
use crate::state::lock::{remove_stale, LockProbe};
use crate::state::{probe_lock, CommitLedger, PauseStore, StatePaths, STATE_DIR};

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ── Status ─────────────────────────────────────────────────────────

/// Snapshot assembled from the lock, pause and ledger files.
pub fn status(root: &Path) -> Result<StatusSnapshot, AutopilotError> {
    let paths = StatePaths::for_repo(root);
    let (running, pid) = match probe_lock(&paths.lock)? {
        LockProbe::Held(info) => (true, info.map(|info| info.pid)),
        LockProbe::Free | LockProbe::Stale(_) => (false, None),
    };
    let pause = PauseStore::new(&paths).load();
    let ledger = CommitLedger::new(&paths);

    Ok(StatusSnapshot {
        running,
        pid,
        paused: pause.is_paused(),
        pause_reason: pause.reason,
        phase: if running { SchedulerPhase::Watching } else { SchedulerPhase::Stopped },
        last_commit: ledger.latest(),
        pending_files: 0,
        commits_today: ledger.count_today(),
    })
}

// ── Pause / resume ─────────────────────────────────────────────────

pub fn pause(root: &Path, reason: Option<&str>) -> Result<PauseState, AutopilotError> {
    let paths = StatePaths::for_repo(root);
    let state = PauseStore::new(&paths).pause(reason)?;
    EventLog::new(&paths.events).record(EventKind::Paused, json!({ "reason": state.reason }));
    Ok(state)
}

pub fn resume(root: &Path) -> Result<PauseState, AutopilotError> {
    let paths = StatePaths::for_repo(root);
    let state = PauseStore::new(&paths).resume()?;
    EventLog::new(&paths.events).record(EventKind::Resumed, json!({}));
    Ok(state)
}

// ── Undo ───────────────────────────────────────────────────────────

pub async fn undo(root: &Path, config: &EffectiveConfig, count: usize) -> Result<UndoReport, AutopilotError> {
    let git = GitWorker::new(root).with_timeouts(GitTimeouts {
        local: Duration::from_secs(config.timeouts.git_seconds),
        network: Duration::from_secs(config.timeouts.network_seconds),
    });
    undo_with(&git, root, count).await
}

pub async fn undo_with<E: CommandExecutor>(
    git: &GitWorker<E>,
    root: &Path,
    count: usize,
) -> Result<UndoReport, AutopilotError> {
    let paths = StatePaths::for_repo(root);
    let report = undo_commits(git, &CommitLedger::new(&paths), count).await?;

    if !report.undone.is_empty() {
        let hashes: Vec<&str> = report.undone.iter().map(|step| step.entry.hash.as_str()).collect();
        EventLog::new(&paths.events).record(EventKind::Undo, json!({ "hashes": hashes }));
    }
    Ok(report)
}

// ── Stop ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    NotRunning,
    /// No live holder; the leftover lock file was removed.
    StaleLockRemoved,
    Stopped { pid: u32 },
}

/// Signal the lock holder and wait up to `wait` for it to release the lock.
pub async fn stop(root: &Path, wait: Duration) -> Result<StopOutcome, AutopilotError> {
    let lock_path = StatePaths::for_repo(root).lock;
    let pid = match probe_lock(&lock_path)? {
        LockProbe::Free => return Ok(StopOutcome::NotRunning),
        LockProbe::Stale(_) => {
            remove_stale(&lock_path)?;
            return Ok(StopOutcome::StaleLockRemoved);
        }
        LockProbe::Held(Some(info)) => info.pid,
        LockProbe::Held(None) => {
            return Err(AutopilotError::RepositoryState(format!(
                "lock at `{}` is held but does not record a pid",
                lock_path.display()
            )))
        }
    };

    send_terminate(pid)?;
    info!(pid, "sent SIGTERM to daemon");

    let deadline = tokio::time::Instant::now() + wait;
    while tokio::time::Instant::now() < deadline {
        tokio::time::sleep(STOP_POLL_INTERVAL).await;
        match probe_lock(&lock_path)? {
            LockProbe::Held(_) => continue,
            LockProbe::Stale(_) => {
                remove_stale(&lock_path)?;
                return Ok(StopOutcome::Stopped { pid });
            }
            LockProbe::Free => return Ok(StopOutcome::Stopped { pid }),
        }
    }

    Err(AutopilotError::RepositoryState(format!(
        "daemon (pid {pid}) did not exit within {}s",
        wait.as_secs()
    )))
}

#[cfg(unix)]
fn send_terminate(pid: u32) -> Result<(), AutopilotError> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| AutopilotError::RepositoryState(format!("invalid pid {pid} in lock file")))?;
    // SAFETY: kill(2) has no memory-safety preconditions.
    let result = unsafe { libc::kill(pid, libc::SIGTERM) };
    if result == 0 {
        Ok(())
    } else {
        let error = std::io::Error::last_os_error();
        Err(AutopilotError::RepositoryState(format!("could not signal pid {pid}: {error}")))
    }
}

#[cfg(not(unix))]
fn send_terminate(pid: u32) -> Result<(), AutopilotError> {
    Err(AutopilotError::RepositoryState(format!(
        "stopping pid {pid} is only supported on Unix; interrupt the daemon directly"
    )))
}

// ── Init ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InitReport {
    pub config_created: bool,
    pub ignore_created: bool,
    pub exclude_updated: bool,
}

/// Create the local config, the ignore file and the state directory, and
/// keep the state directory out of `git status`. Existing files are kept.
pub async fn init<E: CommandExecutor>(
    git: &GitWorker<E>,
    store: &ConfigStore,
) -> Result<InitReport, AutopilotError> {
    let root = git.repo_path();
    if !git.is_work_tree().await? {
        return Err(AutopilotError::RepositoryState(format!(
            "`{}` is not a git repository",
            root.display()
        )));
    }

    let mut report = InitReport { config_created: store.write_local_defaults()?, ..InitReport::default() };

    let ignore_path = root.join(IGNORE_FILE);
    if !ignore_path.exists() {
        fs::write(&ignore_path, default_ignore_file())
            .map_err(|source| AutopilotError::io(&ignore_path, source))?;
        report.ignore_created = true;
    }

    StatePaths::for_repo(root).ensure_dir()?;
    report.exclude_updated = exclude_state_dir(&git.git_dir().await?)?;

    info!(
        repo = %root.display(),
        config = report.config_created,
        ignore = report.ignore_created,
        exclude = report.exclude_updated,
        "initialized repository"
    );
    Ok(report)
}

/// Add the state directory to `info/exclude`. Returns false if already present.
fn exclude_state_dir(git_dir: &Path) -> Result<bool, AutopilotError> {
    let info_dir = git_dir.join("info");
    let exclude = info_dir.join("exclude");
    let entry = format!("{STATE_DIR}/");

    let existing = match fs::read_to_string(&exclude) {
        Ok(contents) => contents,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(source) => return Err(AutopilotError::io(&exclude, source)),
    };
    if existing.lines().any(|line| line.trim() == entry || line.trim() == STATE_DIR) {
        debug!(path = %exclude.display(), "state directory already excluded");
        return Ok(false);
    }

    fs::create_dir_all(&info_dir).map_err(|source| AutopilotError::io(&info_dir, source))?;
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&exclude)
        .map_err(|source| AutopilotError::io(&exclude, source))?;
    let separator = if existing.is_empty() || existing.ends_with('\n') { "" } else { "\n" };
    writeln!(file, "{separator}{entry}").map_err(|source| AutopilotError::io(&exclude, source))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::read_events;
    use crate::git::worker::tests::{ok, MockExecutor};
    use crate::state::RepoLock;
    use autopilot_common::types::LedgerEntry;
    use chrono::Utc;
    use tempfile::TempDir;

    fn entry(hash: &str) -> LedgerEntry {
        LedgerEntry { hash: hash.into(), message: "chore: x".into(), files: vec!["a".into()], timestamp: Utc::now() }
    }

    // ── Status ─────────────────────────────────────────────────────

    #[test]
    fn status_of_fresh_repository_is_stopped_and_running_state() {
        let tmp = TempDir::new().unwrap();
        let snapshot = status(tmp.path()).unwrap();

        assert!(!snapshot.running);
        assert!(!snapshot.paused);
        assert_eq!(snapshot.phase, SchedulerPhase::Stopped);
        assert!(snapshot.last_commit.is_none());
    }

    #[test]
    fn status_reports_lock_holder_pause_and_ledger() {
        let tmp = TempDir::new().unwrap();
        let paths = StatePaths::for_repo(tmp.path());
        let _lock = RepoLock::acquire(&paths.lock).unwrap();
        pause(tmp.path(), Some("lunch")).unwrap();
        CommitLedger::new(&paths).record(entry("abc")).unwrap();

        let snapshot = status(tmp.path()).unwrap();

        assert!(snapshot.running);
        assert_eq!(snapshot.pid, Some(std::process::id()));
        assert_eq!(snapshot.pause_reason.as_deref(), Some("lunch"));
        assert_eq!(snapshot.last_commit.unwrap().hash, "abc");
        assert_eq!(snapshot.commits_today, 1);
    }

    // ── Pause / resume ─────────────────────────────────────────────

    #[test]
    fn pause_and_resume_are_durable_and_logged() {
        let tmp = TempDir::new().unwrap();

        pause(tmp.path(), None).unwrap();
        let reader = PauseStore::new(&StatePaths::for_repo(tmp.path()));
        assert_eq!(reader.load().reason.as_deref(), Some("User paused"));

        resume(tmp.path()).unwrap();
        assert!(!reader.is_paused());

        let events = read_events(&StatePaths::for_repo(tmp.path()).events);
        let kinds: Vec<&str> = events.iter().filter_map(|event| event["type"].as_str()).collect();
        assert_eq!(kinds, vec!["paused", "resumed"]);
    }

    // ── Stop ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn stop_without_lock_reports_not_running() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(stop(tmp.path(), Duration::from_secs(1)).await.unwrap(), StopOutcome::NotRunning);
    }

    #[tokio::test]
    async fn stop_removes_stale_lock_file() {
        let tmp = TempDir::new().unwrap();
        let paths = StatePaths::for_repo(tmp.path());
        paths.ensure_dir().unwrap();
        fs::write(&paths.lock, r#"{"pid":999999,"startedAt":"2024-01-01T00:00:00Z"}"#).unwrap();

        assert_eq!(stop(tmp.path(), Duration::from_secs(1)).await.unwrap(), StopOutcome::StaleLockRemoved);
        assert!(!paths.lock.exists());
    }

    // ── Undo ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn undo_records_event_for_undone_commits() {
        let tmp = TempDir::new().unwrap();
        let paths = StatePaths::for_repo(tmp.path());
        CommitLedger::new(&paths).record(entry("c1")).unwrap();
        let git = GitWorker::with_executor(
            tmp.path(),
            MockExecutor::new(vec![Ok(ok("")), Ok(ok("")), Ok(ok("c1\n")), Ok(ok(""))]),
        );

        let report = undo_with(&git, tmp.path(), 1).await.unwrap();

        assert_eq!(report.undone_count(), 1);
        let events = read_events(&paths.events);
        assert_eq!(events[0]["type"], "undo");
        assert_eq!(events[0]["hashes"][0], "c1");
    }

    // ── Init ───────────────────────────────────────────────────────

    fn init_fixture() -> (TempDir, GitWorker<MockExecutor>) {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join(".git")).unwrap();
        let git_dir = format!("{}\n", tmp.path().join(".git").display());
        let mock = MockExecutor::new(vec![
            Ok(ok("true\n")),
            Ok(ok(&git_dir)),
            Ok(ok("true\n")),
            Ok(ok(&git_dir)),
        ]);
        let git = GitWorker::with_executor(tmp.path(), mock);
        (tmp, git)
    }

    #[tokio::test]
    async fn init_creates_files_once() {
        let (tmp, git) = init_fixture();
        let store = ConfigStore::with_global_path(tmp.path(), None);

        let first = init(&git, &store).await.unwrap();
        assert_eq!(first, InitReport { config_created: true, ignore_created: true, exclude_updated: true });
        assert!(tmp.path().join(crate::config::LOCAL_CONFIG_FILE).exists());
        let ignore = fs::read_to_string(tmp.path().join(IGNORE_FILE)).unwrap();
        assert!(ignore.contains("node_modules/"));
        let exclude = fs::read_to_string(tmp.path().join(".git/info/exclude")).unwrap();
        assert_eq!(exclude, ".autopilot/\n");

        let second = init(&git, &store).await.unwrap();
        assert_eq!(second, InitReport::default());
    }

    #[tokio::test]
    async fn init_appends_to_existing_exclude_file() {
        let (tmp, git) = init_fixture();
        fs::create_dir_all(tmp.path().join(".git/info")).unwrap();
        fs::write(tmp.path().join(".git/info/exclude"), "# comment\n*.swp").unwrap();
        let store = ConfigStore::with_global_path(tmp.path(), None);

        init(&git, &store).await.unwrap();

        let exclude = fs::read_to_string(tmp.path().join(".git/info/exclude")).unwrap();
        assert_eq!(exclude, "# comment\n*.swp\n.autopilot/\n");
    }
}
