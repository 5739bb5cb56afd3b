// `autopilot stop`: signal the daemon holding the repository lock.

use std::time::Duration;

use autopilot_daemon::control::{self, StopOutcome};
use clap::Args;
use serde::Serialize;

use super::{block_on, Target};
use crate::exit_code::NotRunning;
use crate::output;

#[derive(Debug, Args)]
pub struct StopArgs {
    /// Seconds to wait for the daemon to finish its current cycle.
    #[arg(long, default_value_t = 30)]
    pub wait: u64,

    #[command(flatten)]
    pub target: Target,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopResult {
    pub stopped: bool,
    pub pid: Option<u32>,
    pub stale_lock_removed: bool,
}

pub fn run(args: StopArgs) -> anyhow::Result<()> {
    let format = args.target.format();
    let root = args.target.repo_root()?;
    let wait = Duration::from_secs(args.wait);

    let outcome = block_on(async { control::stop(&root, wait).await })??;
    let result = match outcome {
        StopOutcome::NotRunning => return Err(NotRunning.into()),
        StopOutcome::StaleLockRemoved => StopResult { stopped: false, pid: None, stale_lock_removed: true },
        StopOutcome::Stopped { pid } => StopResult { stopped: true, pid: Some(pid), stale_lock_removed: false },
    };
    output::print_output(format, &result, format_human)?;
    Ok(())
}

fn format_human(result: &StopResult) -> String {
    match (result.stopped, result.pid) {
        (true, Some(pid)) => format!("Stopped autopilot (pid {pid})"),
        _ => "Autopilot was not running; removed a stale lock file".to_string(),
    }
}
