// `autopilot config`: get, set and list configuration values.

use autopilot_daemon::config::ConfigScope;
use clap::{Args, Subcommand};
use serde::Serialize;
use serde_json::Value;

use super::{config_store, Target};
use crate::exit_code::UsageError;
use crate::output;

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,

    #[command(flatten)]
    pub target: Target,
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective value of a dotted key
    Get {
        key: String,
    },
    /// Set a dotted key in the local (or global) file
    Set {
        key: String,
        value: String,
        /// Write to the global config instead of the repository's.
        #[arg(long)]
        global: bool,
    },
    /// Print the merged configuration, or one file with --global/--local
    List {
        #[arg(long, conflicts_with = "local")]
        global: bool,
        #[arg(long)]
        local: bool,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyValue {
    pub key: String,
    pub value: Value,
}

pub fn run(args: ConfigArgs) -> anyhow::Result<()> {
    let format = args.target.format();
    let root = args.target.repo_root()?;
    let store = config_store(&root);

    match args.action {
        ConfigAction::Get { key } => {
            let value = store
                .get(&key)?
                .ok_or_else(|| UsageError(format!("unknown config key `{key}`")))?;
            output::print_output(format, &KeyValue { key, value }, |kv| render_value(&kv.value))?;
        }
        ConfigAction::Set { key, value, global } => {
            let scope = if global { ConfigScope::Global } else { ConfigScope::Local };
            let value = store.set(scope, &key, &value)?;
            output::print_output(format, &KeyValue { key, value }, |kv| {
                format!("{} = {}", kv.key, render_value(&kv.value))
            })?;
        }
        ConfigAction::List { global, local } => {
            let value = if global {
                store.raw(ConfigScope::Global)?
            } else if local {
                store.raw(ConfigScope::Local)?
            } else {
                store.merged_value()?
            };
            output::print_output(format, &value, |value| {
                serde_json::to_string_pretty(value).unwrap_or_default()
            })?;
        }
    }
    Ok(())
}

/// Strings print bare; everything else as JSON.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
