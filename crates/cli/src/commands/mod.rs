// CLI subcommand dispatch and shared helpers.

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::Context;
use autopilot_daemon::config::{global_config_path, ConfigStore};
use autopilot_daemon::git::worker::GitWorker;
use autopilot_daemon::startup::resolve_repo_root;
use clap::{Args, Subcommand};
use tracing::debug;

use crate::output::OutputFormat;

pub mod config;
pub mod init;
pub mod pause;
pub mod preset;
pub mod start;
pub mod status;
pub mod stop;
pub mod undo;

#[derive(Subcommand)]
pub enum Command {
    /// Create config and ignore files in a repository
    Init(init::InitArgs),
    /// Watch and auto-commit in the foreground
    Start(start::StartArgs),
    /// Stop the daemon running in a repository
    Stop(stop::StopArgs),
    /// Show running/paused state and the last commit
    Status(status::StatusArgs),
    /// Pause automatic commits
    Pause(pause::PauseArgs),
    /// Resume automatic commits
    Resume(pause::ResumeArgs),
    /// Undo recent autopilot commits
    Undo(undo::UndoArgs),
    /// Read or change configuration
    Config(config::ConfigArgs),
    /// List or apply configuration presets
    Preset(preset::PresetArgs),
}

pub fn run(cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Init(args) => init::run(args),
        Command::Start(args) => start::run(args),
        Command::Stop(args) => stop::run(args),
        Command::Status(args) => status::run(args),
        Command::Pause(args) => pause::run_pause(args),
        Command::Resume(args) => pause::run_resume(args),
        Command::Undo(args) => undo::run(args),
        Command::Config(args) => config::run(args),
        Command::Preset(args) => preset::run(args),
    }
}

impl Command {
    /// Output format the command will use, for error reporting in `main`.
    pub fn format(&self) -> OutputFormat {
        let target = match self {
            Command::Init(args) => &args.target,
            Command::Start(args) => &args.target,
            Command::Stop(args) => &args.target,
            Command::Status(args) => &args.target,
            Command::Pause(args) => &args.target,
            Command::Resume(args) => &args.target,
            Command::Undo(args) => &args.target,
            Command::Config(args) => &args.target,
            Command::Preset(args) => &args.target,
        };
        target.format()
    }
}

/// Repository selection and output flags shared by every command.
#[derive(Debug, Clone, Args)]
pub struct Target {
    /// Repository path (defaults to current directory).
    #[arg(long, short = 'C', value_name = "PATH", global = true)]
    pub repo: Option<PathBuf>,

    /// Force JSON output.
    #[arg(long, global = true)]
    pub json: bool,
}

impl Target {
    pub fn format(&self) -> OutputFormat {
        OutputFormat::detect(self.json)
    }

    pub fn dir(&self) -> anyhow::Result<PathBuf> {
        match &self.repo {
            Some(path) => Ok(path.clone()),
            None => std::env::current_dir().context("failed to read current directory"),
        }
    }

    /// Top-level directory of the selected repository.
    pub fn repo_root(&self) -> anyhow::Result<PathBuf> {
        let dir = self.dir()?;
        let root = block_on(async { resolve_repo_root(&GitWorker::new(&dir)).await })??;
        debug!(root = %root.display(), "resolved repository");
        Ok(root)
    }
}

pub fn config_store(root: &Path) -> ConfigStore {
    ConfigStore::with_global_path(root, global_config_path())
}

/// Run a future to completion from synchronous command code.
pub fn block_on<F: Future>(future: F) -> anyhow::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    Ok(runtime.block_on(future))
}
