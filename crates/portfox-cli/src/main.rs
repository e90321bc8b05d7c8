use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use portfox_core::ReleaseChannel;
use tracing_subscriber::EnvFilter;

mod command_flows;
mod completion;
mod dispatch;
mod render;

#[cfg(test)]
mod tests;

use completion::CliCompletionShell;

const LOG_ENV: &str = "PORTFOX_LOG";

#[derive(Parser, Debug)]
#[command(name = "portfox")]
#[command(about = "Create and update portable Firefox installations", long_about = None)]
#[command(version)]
pub(crate) struct Cli {
    /// Config file; defaults to ./portfox.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Print plain status lines without progress bars or badges.
    #[arg(long, global = true)]
    plain: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the newest published release of a channel.
    Latest {
        #[arg(long, value_enum, default_value_t = CliChannel::Stable)]
        channel: CliChannel,
    },
    /// Compare a portable installation with the newest release.
    Check {
        root: PathBuf,
        #[arg(long, value_enum)]
        channel: Option<CliChannel>,
    },
    /// Replace the Firefox payload of a portable installation.
    Update {
        root: PathBuf,
        #[arg(long, value_enum)]
        channel: Option<CliChannel>,
    },
    /// Build a new portable installation in an empty or new directory.
    Create {
        destination: PathBuf,
        #[arg(long, value_enum, default_value_t = CliChannel::Stable)]
        channel: CliChannel,
    },
    /// Print a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: CliCompletionShell,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliChannel {
    Stable,
    Beta,
    Devedition,
}

impl From<CliChannel> for ReleaseChannel {
    fn from(value: CliChannel) -> Self {
        match value {
            CliChannel::Stable => ReleaseChannel::Stable,
            CliChannel::Beta => ReleaseChannel::Beta,
            CliChannel::Devedition => ReleaseChannel::DevEdition,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    dispatch::run_cli(cli)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
