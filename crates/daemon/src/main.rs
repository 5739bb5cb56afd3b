// autopilotd: foreground daemon for the repository in the current directory.

use anyhow::Context;
use autopilot_daemon::runtime::{run_foreground, DaemonOptions};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let dir = std::env::current_dir().context("failed to read current directory")?;
    info!(dir = %dir.display(), "starting autopilot daemon");
    run_foreground(&dir, DaemonOptions::default())
        .await
        .context("autopilot daemon terminated unexpectedly")
}
