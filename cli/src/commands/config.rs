//! `spacecopy config`: show and set configuration values.

use anyhow::Result;
use clap::Subcommand;
use std::process::ExitCode;

use crate::app::AppContext;
use crate::application::ports::ConfigStore;
use crate::application::services::config_service;
use crate::output::human::HumanRenderer;
use crate::output::json;

/// Config subcommands.
#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,
    /// Set configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },
}

/// Run the config command.
///
/// # Errors
///
/// Returns an error if the configuration cannot be read, validated or written.
pub fn run(app: &AppContext, cmd: ConfigCommand) -> Result<ExitCode> {
    match cmd {
        ConfigCommand::Show => show_config(app),
        ConfigCommand::Set { key, value } => set_config(app, &key, &value),
    }
}

fn show_config(app: &AppContext) -> Result<ExitCode> {
    let config = config_service::load_config(&app.config_store)?;
    let path = app.config_store.path()?;
    if app.is_json() {
        println!("{}", json::format_config(&config, &path)?);
    } else {
        HumanRenderer::new(&app.output).render_config(&config, &path);
    }
    Ok(ExitCode::SUCCESS)
}

fn set_config(app: &AppContext, key: &str, value: &str) -> Result<ExitCode> {
    let config = config_service::set_config_value(&app.config_store, key, value)?;
    if app.is_json() {
        println!("{}", json::format_config(&config, &app.config_store.path()?)?);
    } else {
        app.output.success(&format!("Set {key} = {value}"));
    }
    Ok(ExitCode::SUCCESS)
}
