// `autopilot init`: create config and ignore files in a repository.

use autopilot_daemon::config::LOCAL_CONFIG_FILE;
use autopilot_daemon::control::{self, InitReport};
use autopilot_daemon::git::worker::GitWorker;
use autopilot_daemon::ignore::IGNORE_FILE;
use clap::Args;
use serde::Serialize;

use super::{block_on, config_store, Target};
use crate::output;

#[derive(Debug, Args)]
pub struct InitArgs {
    #[command(flatten)]
    pub target: Target,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitResult {
    pub root_path: String,
    pub config_created: bool,
    pub ignore_created: bool,
    pub exclude_updated: bool,
}

pub fn run(args: InitArgs) -> anyhow::Result<()> {
    let format = args.target.format();
    let root = args.target.repo_root()?;
    let store = config_store(&root);

    let report = block_on(async { control::init(&GitWorker::new(&root), &store).await })??;
    let result = result_from(&root.display().to_string(), report);
    output::print_output(format, &result, format_human)?;
    Ok(())
}

fn result_from(root_path: &str, report: InitReport) -> InitResult {
    InitResult {
        root_path: root_path.to_string(),
        config_created: report.config_created,
        ignore_created: report.ignore_created,
        exclude_updated: report.exclude_updated,
    }
}

fn format_human(result: &InitResult) -> String {
    let mut lines = vec![format!("Initialized autopilot in {}", result.root_path)];
    let created: Vec<&str> = [
        (result.config_created, LOCAL_CONFIG_FILE),
        (result.ignore_created, IGNORE_FILE),
    ]
    .into_iter()
    .filter_map(|(created, name)| created.then_some(name))
    .collect();

    if created.is_empty() {
        lines.push("  Config and ignore files already exist.".into());
    } else {
        lines.push(format!("  Created: {}", created.join(", ")));
    }
    if result.exclude_updated {
        lines.push("  Added .autopilot/ to .git/info/exclude".into());
    }
    lines.push("Next: autopilot start".into());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_human_lists_created_files() {
        let result = result_from(
            "/tmp/project",
            InitReport { config_created: true, ignore_created: true, exclude_updated: true },
        );
        let output = format_human(&result);
        assert!(output.contains("Initialized autopilot in /tmp/project"));
        assert!(output.contains("Created: .autopilotrc.json, .autopilotignore"));
        assert!(output.contains(".git/info/exclude"));
    }

    #[test]
    fn format_human_when_nothing_changed() {
        let output = format_human(&result_from("/tmp/project", InitReport::default()));
        assert!(output.contains("already exist"));
        assert!(!output.contains("Created:"));
    }
}
