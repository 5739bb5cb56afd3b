// Foreground daemon: preflight, lock, watcher and scheduler wired together,
// torn down on SIGINT/SIGTERM.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use autopilot_common::types::StatusSnapshot;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{global_dir, ConfigStore, GLOBAL_CONFIG_FILE};
use crate::events::{EventKind, NoopFocusObserver};
use crate::git::worker::{GitTimeouts, GitWorker};
use crate::identity::IdentityStore;
use crate::outbox::{EventSink, HttpEventSink, OutboxQueue};
use crate::scheduler::{Scheduler, SchedulerDeps};
use crate::startup::{preflight, resolve_repo_root};
use crate::state::{RepoLock, StatePaths};
use crate::watcher::FileWatcher;

/// Where process-wide files live. `None` resolves `$AUTOPILOT_CONFIG_DIR`
/// or `~/.autopilot`.
#[derive(Debug, Clone, Default)]
pub struct DaemonOptions {
    pub global_dir: Option<PathBuf>,
}

pub struct DaemonHandle {
    shutdown_tx: broadcast::Sender<()>,
    scheduler: Arc<Scheduler>,
    task: Option<JoinHandle<()>>,
}

impl DaemonHandle {
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Sender that stops the daemon; for signal handlers.
    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    pub fn repo_root(&self) -> &Path {
        self.scheduler.repo_root()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.scheduler.snapshot()
    }

    /// Wait for the daemon to exit without requesting it.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Request shutdown and wait for the in-flight cycle and cleanup.
    pub async fn stop(self) {
        self.shutdown();
        self.join().await;
    }
}

impl Drop for DaemonHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Start watching the repository containing `dir` on a background task.
pub async fn start(dir: &Path, options: DaemonOptions) -> Result<DaemonHandle> {
    let root = resolve_repo_root(&GitWorker::new(dir)).await?;
    let global = options.global_dir.or_else(global_dir);

    let store = ConfigStore::with_global_path(&root, global.as_ref().map(|dir| dir.join(GLOBAL_CONFIG_FILE)));
    let config = store.load().context("failed to load configuration")?;

    let git = GitWorker::new(&root).with_timeouts(GitTimeouts {
        local: Duration::from_secs(config.timeouts.git_seconds),
        network: Duration::from_secs(config.timeouts.network_seconds),
    });
    let branch = preflight(&git, &config).await?;

    let paths = StatePaths::for_repo(&root);
    paths.ensure_dir()?;
    let lock = RepoLock::acquire(&paths.lock)?;

    let deps = build_deps(global.as_deref(), &config.telemetry);
    if let Some(sink) = &deps.sink {
        if !deps.outbox.pending().is_empty() {
            deps.outbox.spawn_flush(Arc::clone(sink));
        }
    }

    let scheduler = Arc::new(Scheduler::new(&root, store, deps)?);
    let (watcher, changes) = FileWatcher::start(&root, scheduler.matcher())?;

    scheduler.events().record(
        EventKind::DaemonStarted,
        json!({ "pid": std::process::id(), "branch": branch }),
    );
    info!(repo = %root.display(), %branch, pid = std::process::id(), "autopilot daemon started");

    let (shutdown_tx, shutdown_rx) = broadcast::channel(4);
    let task = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move {
            scheduler.run(changes, shutdown_rx).await;
            drop(watcher);
            scheduler.events().record(EventKind::DaemonStopped, json!({ "pid": std::process::id() }));
            lock.release();
            info!(repo = %scheduler.repo_root().display(), "autopilot daemon stopped");
        })
    };

    Ok(DaemonHandle { shutdown_tx, scheduler, task: Some(task) })
}

/// Run in the foreground until SIGINT or SIGTERM.
pub async fn run_foreground(dir: &Path, options: DaemonOptions) -> Result<()> {
    let handle = start(dir, options).await?;

    let shutdown_tx = handle.shutdown_sender();
    tokio::spawn(async move {
        wait_for_termination().await;
        info!("termination signal received, finishing current cycle");
        let _ = shutdown_tx.send(());
    });

    handle.join().await;
    Ok(())
}

fn build_deps(global: Option<&Path>, telemetry: &crate::config::TelemetryConfig) -> SchedulerDeps {
    let (identity, outbox) = match global {
        Some(dir) => (IdentityStore::new(dir), OutboxQueue::new(dir)),
        None => {
            warn!("no global config directory, identity and telemetry queue are in-memory");
            (IdentityStore::in_memory(), OutboxQueue::in_memory())
        }
    };
    let sink = match (&telemetry.enabled, &telemetry.endpoint) {
        (true, Some(endpoint)) => Some(Arc::new(HttpEventSink::new(endpoint.as_str())) as Arc<dyn EventSink>),
        _ => None,
    };

    SchedulerDeps {
        identity: Arc::new(identity),
        outbox: Arc::new(outbox),
        sink,
        observer: Arc::new(NoopFocusObserver),
    }
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(error) => {
            warn!(error = %error, "could not install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
}
