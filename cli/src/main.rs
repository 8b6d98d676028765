//! spacecopy - copy applications and services between Cloud Foundry spaces

use std::process::ExitCode;

use clap::Parser;
use spacecopy_cli::cli::Cli;
use spacecopy_cli::domain::error::error_code;
use spacecopy_cli::output::json;
use tracing_subscriber::EnvFilter;

fn init_tracing(debug: bool) {
    let default = if debug || std::env::var_os("CF_TRACE").is_some() {
        "warn,spacecopy_cli=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    let json_errors = cli.json;
    match cli.run().await {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            match json::format_error(&format!("{e:#}"), error_code(&e)) {
                Ok(out) if json_errors => println!("{out}"),
                _ => eprintln!("Error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
