use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Capflow - plan and run requests against a workspace folder
#[derive(Parser, Debug)]
#[command(name = "capflow")]
#[command(about = "Run a request through the capability engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one request to completion, streaming events as JSON lines
    Run {
        /// Workspace folder commands and document edits are confined to
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// YAML runtime config
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Approve every risky operation without asking
        #[arg(short = 'y', long)]
        yes: bool,

        /// Knowledge-base document id to scope retrieval to (repeatable)
        #[arg(long = "doc")]
        documents: Vec<String>,

        /// Session id used for conversation history
        #[arg(long, default_value = "cli")]
        session: String,

        /// The request
        request: String,
    },
}
