// `autopilot preset`: list or apply bundled configuration presets.

use autopilot_daemon::config::{find_preset, ConfigScope, PRESETS};
use clap::{Args, Subcommand};
use serde::Serialize;

use super::{config_store, Target};
use crate::exit_code::UsageError;
use crate::output;

#[derive(Debug, Args)]
pub struct PresetArgs {
    #[command(subcommand)]
    pub action: PresetAction,

    #[command(flatten)]
    pub target: Target,
}

#[derive(Debug, Subcommand)]
pub enum PresetAction {
    /// Show available presets
    List,
    /// Merge a preset into the repository's config file
    Apply { name: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct PresetInfo {
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppliedPreset {
    pub applied: String,
    pub settings: serde_json::Value,
}

pub fn run(args: PresetArgs) -> anyhow::Result<()> {
    let format = args.target.format();
    match args.action {
        PresetAction::List => {
            let presets = preset_infos();
            output::print_output(format, &presets, |presets| format_list(presets))?;
        }
        PresetAction::Apply { name } => {
            let preset = find_preset(&name).ok_or_else(|| {
                let known: Vec<&str> = PRESETS.iter().map(|preset| preset.name).collect();
                UsageError(format!("unknown preset `{name}` (available: {})", known.join(", ")))
            })?;
            let root = args.target.repo_root()?;
            let settings = preset.settings();
            config_store(&root).merge_into(ConfigScope::Local, settings.clone())?;

            let applied = AppliedPreset { applied: preset.name.to_string(), settings };
            output::print_output(format, &applied, |applied| {
                format!("Applied preset {} to the local config", applied.applied)
            })?;
        }
    }
    Ok(())
}

fn preset_infos() -> Vec<PresetInfo> {
    PRESETS.iter().map(|preset| PresetInfo { name: preset.name, description: preset.description }).collect()
}

fn format_list(presets: &[PresetInfo]) -> String {
    let width = presets.iter().map(|preset| preset.name.len()).max().unwrap_or(0);
    presets
        .iter()
        .map(|preset| format!("{:width$}  {}", preset.name, preset.description))
        .collect::<Vec<_>>()
        .join("\n")
}
