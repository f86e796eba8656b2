use std::path::PathBuf;

use camino::Utf8PathBuf;
use clap::Parser;

#[derive(Parser)]
pub struct Args {
    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Parser, Debug, Clone)]
pub struct GlobalArgs {
    /// Load this TOML file on top of the user configuration.
    #[arg(global = true, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory holding the notes. Overrides `notes_dir` from configuration.
    #[arg(global = true, long, value_name = "PATH", conflicts_with = "in_memory")]
    pub notes_dir: Option<Utf8PathBuf>,

    /// Keep notes in memory; nothing is written to disk.
    #[arg(global = true, long)]
    pub in_memory: bool,

    /// Do not print any log output.
    #[arg(global = true, long, short, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Use verbose log output.
    #[arg(global = true, action = clap::ArgAction::Count, long, short, conflicts_with = "quiet")]
    pub verbose: u8,
}
