// `autopilot status`: running/paused state, last commit and today's count.

use autopilot_common::types::StatusSnapshot;
use autopilot_daemon::control;
use clap::Args;

use super::Target;
use crate::output;

#[derive(Debug, Args)]
pub struct StatusArgs {
    #[command(flatten)]
    pub target: Target,
}

pub fn run(args: StatusArgs) -> anyhow::Result<()> {
    let format = args.target.format();
    let root = args.target.repo_root()?;
    let snapshot = control::status(&root)?;
    output::print_output(format, &snapshot, format_human)?;
    Ok(())
}

fn format_human(snapshot: &StatusSnapshot) -> String {
    let mut lines = Vec::new();
    lines.push(match (snapshot.running, snapshot.pid) {
        (true, Some(pid)) => format!("Autopilot: running (pid {pid})"),
        (true, None) => "Autopilot: running".to_string(),
        (false, _) => "Autopilot: stopped".to_string(),
    });

    if snapshot.paused {
        let reason = snapshot.pause_reason.as_deref().unwrap_or("no reason given");
        lines.push(format!("  Paused: {reason}"));
        lines.push("  Resume with: autopilot resume".into());
    }

    match &snapshot.last_commit {
        Some(entry) => {
            let short = entry.hash.get(..7).unwrap_or(&entry.hash);
            let subject = entry.message.lines().next().unwrap_or_default();
            lines.push(format!(
                "  Last commit: {short} {subject} ({})",
                entry.timestamp.format("%Y-%m-%d %H:%M")
            ));
        }
        None => lines.push("  No autopilot commits yet.".into()),
    }
    lines.push(format!("  Commits today: {}", snapshot.commits_today));

    lines.join("\n")
}
