//! Application service: the copy use-case.
//!
//! Inventories services then applications at the source, then recreates
//! services then applications at the destination. Applications come last
//! because they bind to the copied services.

use anyhow::{Context, Result};
use chrono::Utc;
use spacecopy_common::{
    AppCopyResult, ContentKind, ContextRef, CopySummary, ServiceCopyResult,
};

use crate::application::ports::{
    OrgDirectory, PlatformSession, ProgressReporter, SessionContext, SessionProvider,
};
use crate::application::retry::{Backoff, Poll};
use crate::application::services::applications_manager::{ApplicationsManager, RouteOptions};
use crate::application::services::services_manager::ServicesManager;
use crate::domain::config::CopyConfig;
use crate::domain::context::CopyContext;
use crate::domain::error::CopyError;
use crate::domain::service::UpsSelection;

/// What to copy and how.
#[derive(Debug, Clone)]
pub struct CopyRequest {
    /// Applications to copy; every source application when empty.
    pub apps: Vec<String>,
    pub content: ContentKind,
    /// Managed instances to copy as user-provided services.
    pub force_ups: UpsSelection,
    /// Copy the services bound to the selected applications only.
    pub services_only: bool,
    /// Delete and recreate same-named destination service instances.
    pub recreate_existing: bool,
    pub routes: RouteOptions,
}

impl Default for CopyRequest {
    fn default() -> Self {
        Self {
            apps: Vec::new(),
            content: ContentKind::Bits,
            force_ups: UpsSelection::default(),
            services_only: false,
            recreate_existing: true,
            routes: RouteOptions::default(),
        }
    }
}

/// Target, org and space of a session.
pub fn context_of(session: &impl SessionContext) -> ContextRef {
    ContextRef {
        target: session.target().to_string(),
        org: session.org().name.clone(),
        space: session.space().name.clone(),
    }
}

/// Open the source session at the current target and a destination session
/// pointed at the destination org and space.
///
/// # Errors
///
/// Returns [`CopyError::NoTarget`] when the current CLI config has no org or
/// space, [`CopyError::SameSourceAndDestination`] when nothing would move, or
/// the lookup error of the destination org, space or target.
pub async fn open_sessions<P: SessionProvider>(
    provider: &P,
    dest_space: &str,
    dest_org: Option<&str>,
    dest_target: Option<&str>,
) -> Result<(P::Session, P::Session, CopyContext)> {
    let source = provider
        .open(None)
        .await
        .context("opening source session")?;
    if !source.has_target() {
        return Err(CopyError::NoTarget.into());
    }
    let context = CopyContext::resolve(context_of(&source), dest_space, dest_org, dest_target)?;

    let target = context
        .crosses_targets()
        .then_some(context.destination.target.as_str());
    let mut dest = provider
        .open(target)
        .await
        .with_context(|| format!("opening session for target '{}'", context.destination.target))?;
    let org = dest.find_org(&context.destination.org).await?;
    let space = dest.find_space(&org, &context.destination.space).await?;
    tracing::debug!(org = %org.guid, space = %space.guid, "destination resolved");
    dest.set_context(org, space);
    Ok((source, dest, context))
}

/// Run one copy from `source` to `dest`.
///
/// # Errors
///
/// Returns the first fatal error. Resources created or deleted before it
/// stay as they are.
pub async fn run_copy<S, D, R>(
    source: &S,
    dest: &D,
    reporter: &R,
    config: &CopyConfig,
    request: &CopyRequest,
) -> Result<CopySummary>
where
    S: PlatformSession,
    D: PlatformSession,
    R: ProgressReporter,
{
    let started_at = Utc::now();
    let source_ctx = context_of(source);
    let dest_ctx = context_of(dest);
    let backoff = Backoff::from(&config.retry);
    let poll = Poll::from(&config.start);

    let selected = if request.apps.is_empty() {
        source
            .applications()
            .await
            .context("listing applications at source")?
            .into_iter()
            .map(|a| a.name)
            .collect()
    } else {
        request.apps.clone()
    };
    tracing::debug!(apps = ?selected, "selected applications");

    let services_manager = ServicesManager::new(source, dest, reporter, dest_ctx.clone(), backoff, poll);
    let applications_manager = ApplicationsManager::new(source, dest, reporter, backoff, poll)?;

    let outcome = copy_phases(
        &services_manager,
        &applications_manager,
        &selected,
        request,
    )
    .await;

    if let Err(e) = applications_manager.close() {
        reporter.warn(&format!("{e:#}"));
    }
    let (services, applications) = outcome?;

    Ok(CopySummary {
        source: source_ctx,
        destination: dest_ctx,
        services,
        applications,
        started_at,
        finished_at: Utc::now(),
    })
}

async fn copy_phases<S, D, R>(
    services_manager: &ServicesManager<'_, S, D, R>,
    applications_manager: &ApplicationsManager<'_, S, D, R>,
    selected: &[String],
    request: &CopyRequest,
) -> Result<(Vec<ServiceCopyResult>, Vec<AppCopyResult>)>
where
    S: PlatformSession,
    D: PlatformSession,
    R: ProgressReporter,
{
    let mut services = services_manager
        .services_to_be_copied(selected, &request.force_ups)
        .await?;
    let applications = if request.services_only {
        None
    } else {
        Some(
            applications_manager
                .applications_to_be_copied(selected, request.content)
                .await?,
        )
    };

    services_manager
        .do_copy(&mut services, request.recreate_existing)
        .await?;

    let app_results = match &applications {
        Some(applications) => {
            applications_manager
                .do_copy(applications, &services, &request.routes)
                .await?
        }
        None => Vec::new(),
    };
    Ok((services.results().to_vec(), app_results))
}
