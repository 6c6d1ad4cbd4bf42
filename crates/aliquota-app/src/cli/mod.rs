use std::path::PathBuf;

use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};

/// Top-level CLI entry point.
#[derive(Debug, Parser)]
#[command(
    name = "aliquota",
    version,
    author,
    about = "Automated retrieval and distribution of the IBPT tax-rate table"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(global = true, short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn print_help() {
        let mut cmd = Cli::command();
        let _ = cmd.print_help();
        println!();
    }
}

/// Supported subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Check the published version and download + broadcast when it changed.
    Run(RunArgs),
    /// Compare the published version against the last downloaded record.
    Check,
    /// Retrieve the table unconditionally, skipping the version gate.
    Fetch(RunArgs),
    /// Extract a single state's file from the stored archive.
    Extract(ExtractArgs),
    /// Manage broadcast destinations.
    Groups(GroupsArgs),
}

#[derive(Debug, Args, Default)]
pub struct RunArgs {
    /// Override the output artifact path.
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,
    /// Skip broadcasting even when a Telegram token is configured.
    #[arg(long)]
    pub no_broadcast: bool,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Two-letter state code of the member to extract.
    #[arg(long)]
    pub state: String,
    /// Archive to read (defaults to the stored artifact).
    #[arg(long, value_name = "FILE")]
    pub archive: Option<PathBuf>,
    /// Directory receiving the extracted file (defaults to the data dir).
    #[arg(long, value_name = "DIR")]
    pub dest: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct GroupsArgs {
    #[command(subcommand)]
    pub command: GroupsCommands,
}

#[derive(Debug, Subcommand)]
pub enum GroupsCommands {
    /// List every known destination and its delivery state.
    List,
    /// Register a destination (inactive unless --activate is given).
    Add {
        chat_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        activate: bool,
    },
    /// Forget a destination entirely.
    Remove { chat_id: String },
    /// Enable delivery to a destination.
    Activate { chat_id: String },
    /// Disable delivery without forgetting the destination.
    Deactivate { chat_id: String },
}
