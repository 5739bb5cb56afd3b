// Targeted undo of daemon-authored commits, driven by the commit ledger.

use autopilot_common::types::LedgerEntry;
use tracing::{info, warn};

use crate::error::AutopilotError;
use crate::git::worker::{CommandExecutor, GitWorker};
use crate::state::ledger::CommitLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoAction {
    /// The commit was HEAD: `reset --soft HEAD~1`, changes stay in the tree.
    SoftReset,
    /// Newer commits sit on top: a revert commit was created.
    Revert,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoStep {
    pub entry: LedgerEntry,
    pub action: UndoAction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UndoReport {
    pub undone: Vec<UndoStep>,
    /// Ledger entries whose commit no longer exists.
    pub dropped: Vec<String>,
    /// Set when a reset or revert failed and the run stopped early.
    pub failure: Option<String>,
    pub dirty_worktree: bool,
}

impl UndoReport {
    pub fn undone_count(&self) -> usize {
        self.undone.len()
    }
}

/// Undo up to `count` of the most recent ledger entries, newest first.
///
/// A missing commit drops its stale entry and uses up one step. A failed
/// reset or revert stops the run; the report says how many succeeded.
pub async fn undo<E: CommandExecutor>(
    git: &GitWorker<E>,
    ledger: &CommitLedger,
    count: usize,
) -> Result<UndoReport, AutopilotError> {
    let mut report = UndoReport {
        dirty_worktree: !git.status().await?.is_empty(),
        ..UndoReport::default()
    };
    if report.dirty_worktree {
        warn!("working tree has uncommitted changes; undo keeps them in place");
    }

    for _ in 0..count {
        let Some(entry) = ledger.latest() else {
            info!("no more autopilot commits in the ledger");
            break;
        };

        if !git.commit_exists(&entry.hash).await? {
            warn!(hash = %entry.hash, "commit missing from history, dropping ledger entry");
            ledger.remove(&entry.hash)?;
            report.dropped.push(entry.hash);
            continue;
        }

        let head = git.head().await?;
        let (action, result) = if head == entry.hash {
            (UndoAction::SoftReset, git.reset_soft("HEAD~1").await)
        } else {
            (UndoAction::Revert, git.revert(&entry.hash).await)
        };

        match result {
            Ok(()) => {
                ledger.remove(&entry.hash)?;
                info!(hash = %entry.hash, action = ?action, "undid commit");
                report.undone.push(UndoStep { entry, action });
            }
            Err(error) => {
                warn!(hash = %entry.hash, error = %error, "undo step failed, stopping");
                report.failure = Some(format!("{}: {error}", entry.hash));
                break;
            }
        }
    }

    Ok(report)
}
