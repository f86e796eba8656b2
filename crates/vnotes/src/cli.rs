use std::process::ExitCode;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use vnotes_conf::Settings;

use crate::args::Args;
use crate::commands::VnotesCommand;
use crate::logging;

/// Local-first markdown notes.
#[derive(Parser)]
#[command(name = "vnotes")]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: VnotesCommand,

    #[command(flatten)]
    pub args: Args,
}

/// Parse CLI arguments and execute the chosen command
pub async fn run(args: Vec<String>) -> Result<ExitCode> {
    let cli = Cli::try_parse_from(args).unwrap_or_else(|e| {
        e.exit();
    });

    let settings =
        Settings::new(cli.args.global.config.as_deref()).context("Failed to load settings")?;
    let _guard = logging::init_tracing(&cli.args.global, settings.debug);

    let exit = cli.command.execute(&cli.args, &settings).await?;
    Ok(exit.report())
}
