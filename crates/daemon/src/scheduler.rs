// Watch → decide → act loop for one repository.
//
// One task selects over shutdown, change events and the debounce deadline.
// `process_changes` is guarded by an atomic flag so cycles never overlap;
// events that arrive during a cycle wait in the channel and open the next
// window once it completes.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use autopilot_common::types::{ChangedFile, LedgerEntry, SchedulerPhase, StatusSnapshot};
use chrono::Utc;
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::{ConfigStore, EffectiveConfig, MessageMode};
use crate::error::AutopilotError;
use crate::events::{EventKind, EventLog, FocusObserver, NoopFocusObserver};
use crate::git::message::{synthesize, SIMPLE_MESSAGE};
use crate::git::signer::{TrustSigner, DAEMON_VERSION};
use crate::git::worker::{CommandExecutor, GitTimeouts, GitWorker, ProcessCommandExecutor};
use crate::identity::IdentityStore;
use crate::ignore::IgnoreMatcher;
use crate::outbox::{EventSink, OutboxQueue};
use crate::safety::{SafetyPipeline, TeamOutcome};
use crate::state::{CommitLedger, PauseStore, StatePaths};
use crate::watcher::debounce::CommitDebouncer;
use crate::watcher::{ChangeEvent, SharedMatcher};

/// Process-wide collaborators, constructed once and passed in.
#[derive(Clone)]
pub struct SchedulerDeps {
    pub identity: Arc<IdentityStore>,
    pub outbox: Arc<OutboxQueue>,
    /// Telemetry delivery; `None` keeps events queued locally.
    pub sink: Option<Arc<dyn EventSink>>,
    /// Extra activity observer. The event log always tracks focus itself.
    pub observer: Arc<dyn FocusObserver>,
}

impl SchedulerDeps {
    /// In-memory identity and queue, no delivery, no observer.
    pub fn detached() -> Self {
        Self {
            identity: Arc::new(IdentityStore::in_memory()),
            outbox: Arc::new(OutboxQueue::in_memory()),
            sink: None,
            observer: Arc::new(NoopFocusObserver),
        }
    }
}

/// What one call to `process_changes` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    AlreadyRunning,
    Paused,
    TooSoon,
    Clean,
    BlockedBranch(String),
    RemoteSkipped(String),
    /// Team check paused the daemon.
    RemotePaused(String),
    SafetyBlocked(Vec<String>),
    /// Everything relevant turned out to be ignored once staged.
    NothingStaged,
    Committed { hash: String, files: Vec<String>, pushed: bool },
    /// Committed locally, push failed, daemon paused.
    PushFailed { hash: String, reason: String },
    Failed(String),
}

#[derive(Debug, Default)]
struct RuntimeState {
    phase: SchedulerPhase,
    last_commit_at: Option<Instant>,
    pending_files: usize,
}

/// Clears the processing flag when the cycle ends, even on early return.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl<'a> ProcessingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).ok().map(|_| Self(flag))
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Scheduler<E = ProcessCommandExecutor> {
    repo_root: PathBuf,
    executor: E,
    config_store: ConfigStore,
    config: RwLock<Arc<EffectiveConfig>>,
    matcher: SharedMatcher,
    pause: PauseStore,
    ledger: CommitLedger,
    events: Arc<EventLog>,
    deps: SchedulerDeps,
    processing: AtomicBool,
    state: Mutex<RuntimeState>,
}

impl Scheduler<ProcessCommandExecutor> {
    pub fn new(
        repo_root: &Path,
        config_store: ConfigStore,
        deps: SchedulerDeps,
    ) -> Result<Self, AutopilotError> {
        Self::with_executor(repo_root, config_store, deps, ProcessCommandExecutor)
    }
}

impl<E: CommandExecutor + Clone> Scheduler<E> {
    pub fn with_executor(
        repo_root: &Path,
        config_store: ConfigStore,
        deps: SchedulerDeps,
        executor: E,
    ) -> Result<Self, AutopilotError> {
        let config = config_store.load()?;
        let matcher = IgnoreMatcher::load(repo_root, &config.ignore)?;
        let paths = StatePaths::for_repo(repo_root);

        Ok(Self {
            repo_root: repo_root.to_path_buf(),
            executor,
            config_store,
            config: RwLock::new(Arc::new(config)),
            matcher: Arc::new(RwLock::new(matcher)),
            pause: PauseStore::new(&paths),
            ledger: CommitLedger::new(&paths),
            events: Arc::new(EventLog::new(&paths.events)),
            deps,
            processing: AtomicBool::new(false),
            state: Mutex::new(RuntimeState::default()),
        })
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Matcher handle to share with the filesystem watcher.
    pub fn matcher(&self) -> SharedMatcher {
        Arc::clone(&self.matcher)
    }

    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    pub fn config(&self) -> Arc<EffectiveConfig> {
        match self.config.read() {
            Ok(config) => Arc::clone(&config),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Re-read config and ignore files. On error the previous values stay.
    pub fn reload(&self) -> Result<(), AutopilotError> {
        let config = self.config_store.load()?;
        let matcher = IgnoreMatcher::load(&self.repo_root, &config.ignore)?;

        *self.matcher.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = matcher;
        *self.config.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(config);
        info!(repo = %self.repo_root.display(), "configuration reloaded");
        Ok(())
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Read-only view for status displays.
    pub fn snapshot(&self) -> StatusSnapshot {
        let pause = self.pause.load();
        let state = self.lock_state();
        StatusSnapshot {
            running: true,
            pid: Some(std::process::id()),
            paused: pause.is_paused(),
            pause_reason: pause.reason,
            phase: state.phase,
            last_commit: self.ledger.latest(),
            pending_files: state.pending_files,
            commits_today: self.ledger.count_today(),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RuntimeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_phase(&self, phase: SchedulerPhase) {
        self.lock_state().phase = phase;
    }

    fn git(&self, config: &EffectiveConfig) -> GitWorker<E> {
        GitWorker::with_executor(&self.repo_root, self.executor.clone()).with_timeouts(GitTimeouts {
            local: std::time::Duration::from_secs(config.timeouts.git_seconds),
            network: std::time::Duration::from_secs(config.timeouts.network_seconds),
        })
    }

    // ── Event loop ─────────────────────────────────────────────────

    /// Drive cycles from `changes` until shutdown or until the channel closes.
    /// A cycle in flight when shutdown arrives runs to completion first.
    pub async fn run(
        &self,
        mut changes: mpsc::Receiver<ChangeEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let config = self.config();
        let mut debouncer = CommitDebouncer::new(config.debounce(), config.max_wait());
        self.set_phase(SchedulerPhase::Watching);
        info!(repo = %self.repo_root.display(), "watching for changes");

        loop {
            let config = self.config();
            debouncer.set_timing(config.debounce(), config.max_wait());
            let deadline = debouncer.deadline();

            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    debug!("scheduler received shutdown");
                    break;
                }
                change = changes.recv() => {
                    let Some(change) = change else {
                        debug!("change channel closed");
                        break;
                    };
                    trace_change(&change);
                    self.events.on_file_event(&change.path);
                    self.deps.observer.on_file_event(&change.path);
                    debouncer.push(change.path, change.observed_at);
                    let mut state = self.lock_state();
                    state.phase = SchedulerPhase::Debouncing;
                    state.pending_files = debouncer.pending_count();
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let paths = debouncer.take();
                    debug!(paths = paths.len(), "debounce window closed");
                    self.lock_state().pending_files = 0;
                    self.process_changes().await;
                    self.set_phase(SchedulerPhase::Watching);
                }
            }
        }

        self.set_phase(SchedulerPhase::Stopped);
    }

    // ── Commit cycle ───────────────────────────────────────────────

    /// Run one commit cycle unless one is already in flight.
    pub async fn process_changes(&self) -> CycleOutcome {
        let Some(_guard) = ProcessingGuard::acquire(&self.processing) else {
            debug!("cycle already in flight, skipping");
            return CycleOutcome::AlreadyRunning;
        };
        self.set_phase(SchedulerPhase::Processing);

        let outcome = self.run_cycle().await;
        match &outcome {
            CycleOutcome::Committed { hash, files, pushed } => {
                info!(%hash, files = files.len(), pushed, "committed changes")
            }
            CycleOutcome::SafetyBlocked(violations) => {
                for violation in violations {
                    warn!(%violation, "safety check blocked commit");
                }
            }
            CycleOutcome::PushFailed { reason, .. } => warn!(%reason, "push failed, daemon paused"),
            CycleOutcome::RemotePaused(reason) => warn!(%reason, "remote conflict, daemon paused"),
            CycleOutcome::Failed(reason) => warn!(%reason, "commit cycle failed"),
            other => debug!(outcome = ?other, "cycle skipped"),
        }
        outcome
    }

    async fn run_cycle(&self) -> CycleOutcome {
        let config = self.config();

        if self.pause.is_paused() {
            return CycleOutcome::Paused;
        }

        let last_commit_at = self.lock_state().last_commit_at;
        if let Some(last) = last_commit_at {
            if last.elapsed() < config.min_interval() {
                return CycleOutcome::TooSoon;
            }
        }

        let git = self.git(&config);
        let candidates = match git.status().await {
            Ok(files) => self.relevant(files),
            Err(error) => return CycleOutcome::Failed(error.to_string()),
        };
        if candidates.is_empty() {
            return CycleOutcome::Clean;
        }

        let branch = match git.current_branch().await {
            Ok(branch) => branch,
            Err(error) => return CycleOutcome::Failed(error.to_string()),
        };
        if config.is_blocked_branch(&branch) {
            return CycleOutcome::BlockedBranch(branch);
        }

        let pipeline = SafetyPipeline::new(&git, &config).with_events(&self.events);
        match pipeline.check_team(&branch).await {
            TeamOutcome::Continue => {}
            TeamOutcome::Skip(reason) => return CycleOutcome::RemoteSkipped(reason),
            TeamOutcome::Pause(reason) => {
                self.pause_with(&reason);
                return CycleOutcome::RemotePaused(reason);
            }
        }

        let report = pipeline.validate(&candidates).await;
        if !report.ok() {
            self.events.record(EventKind::SafetyBlocked, json!({ "violations": report.violations }));
            return CycleOutcome::SafetyBlocked(report.violations);
        }

        let (hash, files) = match self.commit(&git, &config, &candidates).await {
            Ok(Some(committed)) => committed,
            Ok(None) => return CycleOutcome::NothingStaged,
            Err(error) => return CycleOutcome::Failed(error.to_string()),
        };

        if !config.auto_push {
            return CycleOutcome::Committed { hash, files, pushed: false };
        }

        match git.push(&config.remote, &branch).await {
            Ok(()) => {
                self.events.record(EventKind::Push, json!({ "hash": hash, "branch": branch }));
                self.publish_telemetry(&config, &hash, files.len());
                CycleOutcome::Committed { hash, files, pushed: true }
            }
            Err(error) => {
                let reason = format!("push failed: {error}");
                self.events.record(EventKind::PushFailed, json!({ "hash": hash, "error": error.to_string() }));
                self.pause_with(&reason);
                CycleOutcome::PushFailed { hash, reason }
            }
        }
    }

    /// Drop paths the ignore matcher rejects.
    fn relevant(&self, files: Vec<ChangedFile>) -> Vec<ChangedFile> {
        let matcher = self.matcher.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        files.into_iter().filter(|file| !matcher.is_ignored(&file.path)).collect()
    }

    /// Stage, re-check, describe, sign and commit. `Ok(None)` when nothing
    /// relevant is left in the index. Any failure after staging restores the
    /// index before returning.
    async fn commit(
        &self,
        git: &GitWorker<E>,
        config: &EffectiveConfig,
        candidates: &[ChangedFile],
    ) -> Result<Option<(String, Vec<String>)>, AutopilotError> {
        let paths: Vec<&str> = candidates.iter().map(|file| file.path.as_str()).collect();
        git.add(&paths).await?;

        let (hash, staged, message) = match self.commit_staged(git, config, candidates).await {
            Ok(Some(committed)) => committed,
            Ok(None) => return Ok(None),
            Err(error) => {
                if let Err(unstage_error) = git.unstage(&paths).await {
                    warn!(error = %unstage_error, "could not unstage after failed cycle");
                }
                return Err(error);
            }
        };

        // Committed: ledger failures are logged, not returned.
        if let Err(error) = self.ledger.record(LedgerEntry {
            hash: hash.clone(),
            message,
            files: staged.clone(),
            timestamp: Utc::now(),
        }) {
            warn!(%hash, error = %error, "failed to record commit in ledger");
        }
        self.lock_state().last_commit_at = Some(Instant::now());
        self.events.record(EventKind::Commit, json!({ "hash": hash, "files": staged }));
        self.events.on_commit(&hash, &staged);
        self.deps.observer.on_commit(&hash, &staged);

        Ok(Some((hash, staged)))
    }

    /// Returns `(hash, staged paths, message without trailers)`.
    async fn commit_staged(
        &self,
        git: &GitWorker<E>,
        config: &EffectiveConfig,
        candidates: &[ChangedFile],
    ) -> Result<Option<(String, Vec<String>, String)>, AutopilotError> {
        let staged = git.staged_paths().await?;
        let (ignored, staged): (Vec<String>, Vec<String>) = {
            let matcher = self.matcher.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            staged.into_iter().partition(|path| matcher.is_ignored(path))
        };
        if !ignored.is_empty() {
            warn!(paths = ?ignored, "ignored paths reached the index, unstaging");
            git.unstage(&ignored).await?;
        }
        if staged.is_empty() {
            return Ok(None);
        }

        let files: Vec<ChangedFile> =
            candidates.iter().filter(|file| staged.contains(&file.path)).cloned().collect();
        let message = match config.commit_message_mode {
            MessageMode::Simple => SIMPLE_MESSAGE.to_string(),
            MessageMode::Smart => synthesize(&files, &git.diff_cached().await?),
        };
        let full_message = if config.trust_trailers {
            TrustSigner::new(&self.deps.identity).sign_message(&message, Utc::now())
        } else {
            message.clone()
        };

        let hash = git.commit(&full_message).await?;
        Ok(Some((hash, staged, message)))
    }

    fn pause_with(&self, reason: &str) {
        match self.pause.pause(Some(reason)) {
            Ok(_) => self.events.record(EventKind::Paused, json!({ "reason": reason })),
            Err(error) => warn!(error = %error, "failed to persist pause state"),
        }
    }

    fn publish_telemetry(&self, config: &EffectiveConfig, hash: &str, file_count: usize) {
        if !config.telemetry.enabled {
            return;
        }
        let identity = self.deps.identity.get();
        self.deps.outbox.enqueue(json!({
            "type": "commit_pushed",
            "userId": identity.id,
            "version": DAEMON_VERSION,
            "hash": hash,
            "fileCount": file_count,
            "timestamp": Utc::now().to_rfc3339(),
        }));
        if let Some(sink) = &self.deps.sink {
            self.deps.outbox.spawn_flush(Arc::clone(sink));
        }
    }
}

fn trace_change(change: &ChangeEvent) {
    tracing::trace!(path = %change.path, kind = ?change.kind, "change observed");
}
