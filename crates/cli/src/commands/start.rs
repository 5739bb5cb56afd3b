// `autopilot start`: run the daemon in the foreground until interrupted.

use anyhow::Context;
use autopilot_daemon::runtime::{run_foreground, DaemonOptions};
use clap::Args;

use super::{block_on, Target};

#[derive(Debug, Args)]
pub struct StartArgs {
    #[command(flatten)]
    pub target: Target,
}

pub fn run(args: StartArgs) -> anyhow::Result<()> {
    let dir = args.target.dir()?;
    block_on(async { run_foreground(&dir, DaemonOptions::default()).await })?
        .context("failed to start autopilot")
}
