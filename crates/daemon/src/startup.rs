// Start-up preflight: the checks a repository must pass before the daemon
// takes the lock and begins watching.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::EffectiveConfig;
use crate::error::AutopilotError;
use crate::git::worker::{CommandExecutor, GitWorker};

/// Resolve the work-tree root containing `dir`.
pub async fn resolve_repo_root<E: CommandExecutor>(git: &GitWorker<E>) -> Result<PathBuf, AutopilotError> {
    if !git.is_work_tree().await? {
        return Err(not_a_repository(git.repo_path()));
    }
    Ok(git.toplevel().await?)
}

/// Refuse to start on a blocked branch or in the middle of a merge/rebase.
/// Returns the current branch.
pub async fn preflight<E: CommandExecutor>(
    git: &GitWorker<E>,
    config: &EffectiveConfig,
) -> Result<String, AutopilotError> {
    if !git.is_work_tree().await? {
        return Err(not_a_repository(git.repo_path()));
    }

    let branch = git.current_branch().await?;
    if config.is_blocked_branch(&branch) {
        return Err(AutopilotError::RepositoryState(format!(
            "branch `{branch}` is blocked; switch to a feature branch or edit blockBranches"
        )));
    }

    if let Some(operation) = git.in_progress_operation().await? {
        return Err(AutopilotError::RepositoryState(format!(
            "a {operation} is in progress; finish or abort it first"
        )));
    }

    info!(%branch, repo = %git.repo_path().display(), "preflight passed");
    Ok(branch)
}

fn not_a_repository(path: &Path) -> AutopilotError {
    AutopilotError::RepositoryState(format!("`{}` is not a git repository", path.display()))
}
