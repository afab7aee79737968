use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

use crate::config::ENV_CONFIG;

#[derive(Parser)]
#[command(name = "catalog-ingest")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Ingest metadata into a data catalog in dependency order", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create or update every configured entity in the catalog
    Run(RunArgs),

    /// Show the execution order without touching the catalog
    Plan(ConfigArgs),

    /// Check the configuration file
    Validate(ConfigArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Config file (default: ~/.config/catalog-ingest/config.toml)
    #[arg(short, long, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Decide every action but write nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}
