// autopilot CLI entry point.

use std::process;

use clap::Parser;

mod commands;
mod exit_code;
mod output;

use exit_code::ExitCode;

#[derive(Parser)]
#[command(name = "autopilot", version, about = "Safe automatic commits for a git working tree")]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,
}

fn main() -> process::ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.command);

    let format = cli.command.format();
    match commands::run(cli.command) {
        Ok(()) => ExitCode::Success.into(),
        Err(error) => {
            output::print_anyhow_error(format, &error);
            ExitCode::from_error(&error).into()
        }
    }
}

/// `start` logs at info by default; other commands stay quiet unless
/// `RUST_LOG` says otherwise.
fn init_tracing(command: &commands::Command) {
    let default = if matches!(command, commands::Command::Start(_)) { "info" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}
