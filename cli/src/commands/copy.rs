//! `spacecopy copy`: copy applications and their services to another space.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use spacecopy_common::ContentKind;

use crate::app::AppContext;
use crate::application::services::applications_manager::RouteOptions;
use crate::application::services::config_service;
use crate::application::services::copy::{CopyRequest, open_sessions, run_copy};
use crate::domain::route::HostTemplate;
use crate::domain::service::UpsSelection;
use crate::infra::cloud_controller::CfSessionProvider;
use crate::infra::targets::TargetsPluginInfo;
use crate::output::human::{HumanRenderer, context_label};
use crate::output::reporter::TerminalReporter;
use crate::output::{json, progress};

/// Arguments for the copy command.
#[derive(Args, Debug)]
pub struct CopyArgs {
    /// Destination space
    pub dest_space: String,

    /// Destination organization (defaults to the current one)
    pub dest_org: Option<String>,

    /// Destination target saved with the cf targets plugin (defaults to the current one)
    pub dest_target: Option<String>,

    /// Applications to copy (all applications in the space when omitted)
    #[arg(short, long, value_delimiter = ',')]
    pub apps: Vec<String>,

    /// Host name format of copied routes, e.g. '{{.space}}-{{.app}}'
    #[arg(short = 'n', long)]
    pub host_format: Option<String>,

    /// Domain of every copied route
    #[arg(short = 'm', long)]
    pub domain: Option<String>,

    /// Copy the staged droplet instead of the application bits
    #[arg(short = 'c', long)]
    pub droplet: bool,

    /// Managed service instances to copy as user-provided services
    #[arg(short = 's', long = "ups", value_delimiter = ',')]
    pub ups: Vec<String>,

    /// Service offerings whose instances are copied as user-provided services
    #[arg(short = 't', long, value_delimiter = ',')]
    pub service_types: Vec<String>,

    /// Copy services only
    #[arg(short = 'o', long)]
    pub services_only: bool,

    /// Keep same-named service instances at the destination
    #[arg(long)]
    pub keep_existing_services: bool,
}

impl CopyArgs {
    /// Translate the flags into a copy request.
    ///
    /// # Errors
    ///
    /// Returns an error if the host format is invalid.
    pub fn request(&self) -> Result<CopyRequest> {
        let host_format = self
            .host_format
            .as_deref()
            .map(HostTemplate::parse)
            .transpose()?;
        Ok(CopyRequest {
            apps: self.apps.clone(),
            content: if self.droplet {
                ContentKind::Droplet
            } else {
                ContentKind::Bits
            },
            force_ups: UpsSelection {
                names: self.ups.clone(),
                offering_labels: self.service_types.clone(),
            },
            services_only: self.services_only,
            recreate_existing: !self.keep_existing_services,
            routes: RouteOptions {
                host_format,
                domain: self.domain.clone(),
            },
        })
    }
}

/// Run the copy command.
///
/// # Errors
///
/// Returns an error if the destination cannot be resolved or the copy fails.
pub async fn run(app: &AppContext, args: CopyArgs) -> Result<ExitCode> {
    let request = args.request()?;
    let config = config_service::load_config(&app.config_store)?;
    let provider = CfSessionProvider::new(
        TargetsPluginInfo::discover()?,
        Duration::from_secs(config.http.timeout_secs),
        app.output.transfer_progress(),
    );

    let pb = app
        .output
        .show_progress()
        .then(|| progress::spinner("Resolving destination..."));
    let opened = open_sessions(
        &provider,
        &args.dest_space,
        args.dest_org.as_deref(),
        args.dest_target.as_deref(),
    )
    .await;
    let (source, dest, context) = match opened {
        Ok(opened) => {
            if let Some(pb) = &pb {
                progress::finish_ok(pb, "Destination resolved");
            }
            opened
        }
        Err(e) => {
            if let Some(pb) = &pb {
                progress::finish_error(pb, "Cannot resolve destination");
            }
            return Err(e);
        }
    };

    let renderer = HumanRenderer::new(&app.output);
    renderer.render_plan(&context.source, &context.destination);

    let replaced = if request.recreate_existing {
        "applications and services"
    } else {
        "applications"
    };
    let prompt = format!(
        "Same-named {replaced} in {} will be replaced. Continue?",
        context_label(&context.destination)
    );
    if !app.confirm(&prompt, true)? {
        app.output.info("Aborted.");
        return Ok(ExitCode::FAILURE);
    }

    let reporter = TerminalReporter::new(&app.output);
    let summary = run_copy(&source, &dest, &reporter, &config, &request).await?;

    if app.is_json() {
        println!("{}", json::format_summary(&summary)?);
    } else {
        renderer.render_summary(&summary);
    }
    Ok(ExitCode::SUCCESS)
}
