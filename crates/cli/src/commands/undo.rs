// `autopilot undo`: roll back recent autopilot commits.

use autopilot_daemon::control;
use autopilot_daemon::git::undo::{UndoAction, UndoReport};
use clap::Args;
use serde::Serialize;

use super::{block_on, config_store, Target};
use crate::exit_code::UsageError;
use crate::output;

#[derive(Debug, Args)]
pub struct UndoArgs {
    /// Number of commits to undo, newest first.
    #[arg(long, short = 'n', default_value_t = 1)]
    pub count: usize,

    #[command(flatten)]
    pub target: Target,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoResult {
    pub undone: Vec<UndoneCommit>,
    pub dropped: Vec<String>,
    pub failure: Option<String>,
    pub dirty_worktree: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UndoneCommit {
    pub hash: String,
    pub message: String,
    /// `reset` or `revert`.
    pub action: &'static str,
}

pub fn run(args: UndoArgs) -> anyhow::Result<()> {
    let format = args.target.format();
    if args.count == 0 {
        return Err(UsageError("--count must be at least 1".into()).into());
    }
    let root = args.target.repo_root()?;
    let config = config_store(&root).load()?;

    let report = block_on(async { control::undo(&root, &config, args.count).await })??;
    if report.dirty_worktree {
        output::print_warning(
            format,
            "DIRTY_WORKTREE",
            "working tree has uncommitted changes; they were left in place",
        );
    }

    let result = UndoResult::from(report);
    output::print_output(format, &result, format_human)?;
    if let Some(failure) = &result.failure {
        anyhow::bail!("undo stopped early: {failure}");
    }
    Ok(())
}

impl From<UndoReport> for UndoResult {
    fn from(report: UndoReport) -> Self {
        Self {
            undone: report
                .undone
                .into_iter()
                .map(|step| UndoneCommit {
                    hash: step.entry.hash,
                    message: step.entry.message.lines().next().unwrap_or_default().to_string(),
                    action: match step.action {
                        UndoAction::SoftReset => "reset",
                        UndoAction::Revert => "revert",
                    },
                })
                .collect(),
            dropped: report.dropped,
            failure: report.failure,
            dirty_worktree: report.dirty_worktree,
        }
    }
}

fn format_human(result: &UndoResult) -> String {
    if result.undone.is_empty() && result.dropped.is_empty() {
        return "No autopilot commits to undo.".to_string();
    }

    let mut lines = vec![format!("Undid {} commit(s)", result.undone.len())];
    for commit in &result.undone {
        let short = commit.hash.get(..7).unwrap_or(&commit.hash);
        let how = if commit.action == "reset" { "soft reset, changes kept" } else { "reverted" };
        lines.push(format!("  {short} {} ({how})", commit.message));
    }
    for hash in &result.dropped {
        lines.push(format!("  {hash} no longer exists; removed from ledger"));
    }
    lines.join("\n")
}
