use std::path::Path;

use anyhow::{Context, Result};
use portfox_core::PortfoxConfig;
use portfox_installer::Workers;

use crate::command_flows::{
    format_check_lines, format_create_lines, format_latest_lines, format_update_lines,
    run_check_command, run_create_command, run_latest_command, run_update_command,
};
use crate::completion::write_completions_script;
use crate::render::{current_output_style, TerminalRenderer};
use crate::{Cli, Commands};

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let renderer = TerminalRenderer::from_style(current_output_style(cli.plain));
    let style = renderer.style();
    let workers = Workers::new();

    match cli.command {
        Commands::Completions { shell } => {
            let mut stdout = std::io::stdout().lock();
            write_completions_script(shell, &mut stdout)?;
        }
        Commands::Latest { channel } => {
            let config = load_config(cli.config.as_deref())?;
            let channel = channel.into();
            let descriptor = run_latest_command(&config, channel)?;
            renderer.print_lines(&format_latest_lines(channel, &descriptor, style));
        }
        Commands::Check { root, channel } => {
            let config = load_config(cli.config.as_deref())?;
            let check = run_check_command(&workers, &config, &root, channel.map(Into::into))?;
            renderer.print_lines(&format_check_lines(&check, style));
        }
        Commands::Update { root, channel } => {
            let config = load_config(cli.config.as_deref())?;
            let report = run_update_command(
                &workers,
                &config,
                &root,
                channel.map(Into::into),
                renderer,
            )?;
            renderer.print_lines(&format_update_lines(&report, style));
            report.result?;
        }
        Commands::Create {
            destination,
            channel,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let report =
                run_create_command(&workers, &config, &destination, channel.into(), renderer)?;
            renderer.print_lines(&format_create_lines(&report, style));
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<PortfoxConfig> {
    PortfoxConfig::load(path).context("failed to load portfox configuration")
}
