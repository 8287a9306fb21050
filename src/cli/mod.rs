//! CLI module for Folio
//!
//! Provides commands:
//! - `replay`: Run a JSON edit script through an editing session
//! - `config`: Print the resolved configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod replay;

/// Folio notebook editor CLI
#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(about = "Notebook page editing core")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay an edit script against the in-memory store
    Replay {
        /// Path to the JSON script
        script: PathBuf,
        /// Abort on the first failing step
        #[arg(long)]
        strict: bool,
        /// Print the report on a single line
        #[arg(long)]
        compact: bool,
    },
    /// Print the resolved configuration
    Config,
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Replay {
            script,
            strict,
            compact,
        }) => {
            let config = crate::settings::load_config()?;
            replay::run(&script, &config, strict, compact).await
        }
        Some(Commands::Config) => {
            let config = crate::settings::load_config()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}
