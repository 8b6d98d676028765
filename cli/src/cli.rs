//! CLI argument parsing with clap derive

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::app::{AppContext, AppFlags, BehaviourFlags, OutputFlags};
use crate::commands;

/// Copy applications and services between Cloud Foundry spaces
#[derive(Parser)]
#[command(
    name = "spacecopy",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Print debug diagnostics to stderr
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Do not ask for confirmation
    #[arg(short, long, global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Copy applications and their services to another space
    Copy(commands::copy::CopyArgs),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::config::ConfigCommand),

    /// Show version
    Version,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn run(self) -> Result<ExitCode> {
        let Cli {
            json,
            quiet,
            no_color,
            yes,
            command,
            ..
        } = self;
        let app = AppContext::new(&AppFlags {
            output: OutputFlags {
                no_color,
                quiet,
                json,
            },
            behaviour: BehaviourFlags { yes },
        });
        match command {
            Command::Copy(args) => commands::copy::run(&app, args).await,
            Command::Config(cmd) => commands::config::run(&app, cmd),
            Command::Version => Ok(commands::version::run(&app)),
        }
    }
}
