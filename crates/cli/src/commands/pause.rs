// `autopilot pause` / `autopilot resume`: toggle the persisted pause flag.

use autopilot_common::types::PauseState;
use autopilot_daemon::control;
use clap::Args;

use super::Target;
use crate::output;

#[derive(Debug, Args)]
pub struct PauseArgs {
    /// Why automation is paused (shown by `status`).
    #[arg(value_name = "REASON", trailing_var_arg = true)]
    pub reason: Vec<String>,

    #[command(flatten)]
    pub target: Target,
}

#[derive(Debug, Args)]
pub struct ResumeArgs {
    #[command(flatten)]
    pub target: Target,
}

pub fn run_pause(args: PauseArgs) -> anyhow::Result<()> {
    let format = args.target.format();
    let root = args.target.repo_root()?;
    let reason = args.reason.join(" ");
    let state = control::pause(&root, (!reason.is_empty()).then_some(reason.as_str()))?;
    output::print_output(format, &state, format_human)?;
    Ok(())
}

pub fn run_resume(args: ResumeArgs) -> anyhow::Result<()> {
    let format = args.target.format();
    let root = args.target.repo_root()?;
    let state = control::resume(&root)?;
    output::print_output(format, &state, format_human)?;
    Ok(())
}

fn format_human(state: &PauseState) -> String {
    if state.is_paused() {
        format!("Paused: {}", state.reason.as_deref().unwrap_or_default())
    } else {
        "Resumed".to_string()
    }
}
