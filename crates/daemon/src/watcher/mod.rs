// Filesystem watcher: inotify/fsevents → ignore filter → repo-relative events.
// Timing (debounce and max-wait) lives in `debounce`; the scheduler owns both.

pub mod debounce;

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use autopilot_common::path::relative_to_root;
use autopilot_common::types::ChangeKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, trace};

use crate::ignore::IgnoreMatcher;

/// Ignore matcher shared by the watcher and the scheduler's pre-stage check.
/// `Scheduler::reload` swaps the contents in place.
pub type SharedMatcher = Arc<RwLock<IgnoreMatcher>>;

/// A relevant change to one repository path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    /// Repo-relative, `/`-separated.
    pub path: String,
    /// When the OS event was translated; debounce windows are measured from here.
    pub observed_at: Instant,
}

/// Capacity for the internal event channel.
const EVENT_CHANNEL_CAPACITY: usize = 512;

/// Watches a repository recursively and forwards non-ignored changes.
///
/// Dropping the watcher closes the OS watch; the receiver then drains and ends.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FileWatcher {
    pub fn start(root: &Path, matcher: SharedMatcher) -> Result<(Self, mpsc::Receiver<ChangeEvent>)> {
        let root = root
            .canonicalize()
            .with_context(|| format!("failed to canonicalize watch root: {}", root.display()))?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let root_for_filter = root.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let matcher = match matcher.read() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let changes = translate_event(&event, &root_for_filter, &matcher);
                drop(matcher);
                for change in changes {
                    if tx.blocking_send(change).is_err() {
                        debug!("event channel closed, stopping event dispatch");
                        return;
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "file watcher error");
            }
        })
        .context("failed to create file watcher")?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch directory: {}", root.display()))?;

        debug!(path = %root.display(), "file watcher started");

        Ok((Self { _watcher: watcher, root }, rx))
    }

    /// The canonicalized root directory being watched.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Translate a `notify::Event` into repo-relative changes, dropping ignored
/// paths and paths outside the root.
fn translate_event(event: &Event, root: &Path, matcher: &IgnoreMatcher) -> Vec<ChangeEvent> {
    let kind = match &event.kind {
        EventKind::Create(_) => ChangeKind::Create,
        EventKind::Modify(notify::event::ModifyKind::Metadata(_)) => {
            trace!("skipping metadata-only modify event");
            return Vec::new();
        }
        EventKind::Modify(_) => ChangeKind::Modify,
        EventKind::Remove(_) => ChangeKind::Delete,
        _ => {
            trace!(kind = ?event.kind, "skipping non-content event");
            return Vec::new();
        }
    };

    let observed_at = Instant::now();
    event
        .paths
        .iter()
        .filter_map(|path| match relative_to_root(root, path) {
            Ok(relative) => Some(relative),
            Err(_) => {
                trace!(path = %path.display(), "ignoring event outside watch root");
                None
            }
        })
        .filter(|relative| !matcher.is_ignored(relative))
        .map(|path| ChangeEvent { kind, path, observed_at })
        .collect()
}
