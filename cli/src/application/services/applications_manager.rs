//! Applications manager: payload download, destination recreation,
//! service rebinding, start and route recreation of copied applications.

use std::cell::RefCell;
use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use spacecopy_common::{
    AppCopyResult, AppState, Application, ContentKind, Domain, OrgRef, Route, SkippedRoute,
    SpaceRef,
};
use tempfile::TempDir;

use crate::application::ports::{PlatformSession, ProgressReporter};
use crate::application::retry::{Backoff, Poll, poll_until, retry_with_backoff};
use crate::application::services::content::AppContent;
use crate::application::services::services_manager::ServiceCollection;
use crate::domain::app::destination_params;
use crate::domain::error::{CopyError, is_not_found};
use crate::domain::route::{DomainChoice, HostTemplate, HostVars, choose_domain};

/// One source application scheduled for copy, payload already staged.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationRecord {
    pub app: Application,
    pub content: AppContent,
    /// Size of the staged payload.
    pub bytes: u64,
    pub sha256: String,
}

/// Applications to copy plus the source default domain captured with them.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationCollection {
    records: Vec<ApplicationRecord>,
    source_default_domain: Domain,
}

impl ApplicationCollection {
    #[must_use]
    pub fn records(&self) -> &[ApplicationRecord] {
        &self.records
    }

    #[must_use]
    pub fn source_default_domain(&self) -> &Domain {
        &self.source_default_domain
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// How routes of copied applications are named at the destination.
#[derive(Debug, Clone, Default)]
pub struct RouteOptions {
    /// Host format; the source host is reused when unset.
    pub host_format: Option<HostTemplate>,
    /// Domain used for every route instead of the derived one.
    pub domain: Option<String>,
}

/// Destination domains, read once per run.
struct DestinationDomains {
    default: Domain,
    listed: Vec<Domain>,
    forced: Option<Domain>,
}

/// Copies applications from the source session to the destination.
pub struct ApplicationsManager<'a, S, D, R> {
    source: &'a S,
    dest: &'a D,
    reporter: &'a R,
    dest_org: OrgRef,
    dest_space: SpaceRef,
    staging: TempDir,
    backoff: Backoff,
    poll: Poll,
}

impl<'a, S, D, R> ApplicationsManager<'a, S, D, R>
where
    S: PlatformSession,
    D: PlatformSession,
    R: ProgressReporter,
{
    /// Create a manager with a fresh staging directory. The destination org
    /// and space are captured from `dest` now.
    ///
    /// # Errors
    ///
    /// Fails if the staging directory cannot be created.
    pub fn new(
        source: &'a S,
        dest: &'a D,
        reporter: &'a R,
        backoff: Backoff,
        poll: Poll,
    ) -> Result<Self> {
        let staging = tempfile::Builder::new()
            .prefix("spacecopy-")
            .tempdir()
            .context("creating staging directory")?;
        Ok(Self {
            source,
            dest,
            reporter,
            dest_org: dest.org().clone(),
            dest_space: dest.space().clone(),
            staging,
            backoff,
            poll,
        })
    }

    /// Directory holding downloaded payloads until [`Self::close`].
    #[must_use]
    pub fn staging_dir(&self) -> &Path {
        self.staging.path()
    }

    /// Look up every selected application at the source and download its
    /// payload. Also captures the source default domain.
    ///
    /// # Errors
    ///
    /// Fails on the first missing application or failed download.
    pub async fn applications_to_be_copied(
        &self,
        selected: &[String],
        kind: ContentKind,
    ) -> Result<ApplicationCollection> {
        let apps = self
            .source
            .applications()
            .await
            .context("listing applications at source")?;

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for name in selected {
            if !seen.insert(name.as_str()) {
                continue;
            }
            let app = apps
                .iter()
                .find(|a| &a.name == name)
                .cloned()
                .ok_or_else(|| CopyError::AppNotFound(name.clone()))?;

            let content = AppContent::new(&app, self.staging_dir(), kind);
            self.reporter.step(&format!(
                "downloading {} of {name}",
                match kind {
                    ContentKind::Bits => "bits",
                    ContentKind::Droplet => "droplet",
                }
            ));
            let bytes = content.fetch(self.source).await?;
            let sha256 = content.sha256().await?;
            tracing::debug!(app = %name, bytes, sha256 = %sha256, "payload staged");
            records.push(ApplicationRecord {
                app,
                content,
                bytes,
                sha256,
            });
        }

        let source_default_domain = self
            .source
            .default_domain()
            .await
            .context("reading source default domain")?;

        Ok(ApplicationCollection {
            records,
            source_default_domain,
        })
    }

    /// Recreate every collected application at the destination, in
    /// inventory order.
    ///
    /// # Errors
    ///
    /// The first error aborts the remaining applications. Routes without a
    /// matching destination domain are skipped with a warning instead.
    pub async fn do_copy(
        &self,
        applications: &ApplicationCollection,
        services: &ServiceCollection,
        routes: &RouteOptions,
    ) -> Result<Vec<AppCopyResult>> {
        if applications.is_empty() {
            return Ok(Vec::new());
        }
        let domains = self.destination_domains(routes.domain.as_deref()).await?;

        let mut results = Vec::new();
        for record in applications.records() {
            let result = self
                .copy_one(record, applications.source_default_domain(), services, routes, &domains)
                .await
                .with_context(|| format!("copying application {}", record.app.name))?;
            self.reporter
                .success(&format!("copied application {}", record.app.name));
            results.push(result);
        }
        Ok(results)
    }

    async fn destination_domains(&self, forced: Option<&str>) -> Result<DestinationDomains> {
        let default = self
            .dest
            .default_domain()
            .await
            .context("reading destination default domain")?;
        let listed = self
            .dest
            .domains()
            .await
            .context("listing destination domains")?;
        let forced = match forced {
            Some(name) => Some(
                self.dest
                    .find_domain(name)
                    .await
                    .with_context(|| format!("looking up domain {name} at destination"))?,
            ),
            None => None,
        };
        Ok(DestinationDomains {
            default,
            listed,
            forced,
        })
    }

    async fn copy_one(
        &self,
        record: &ApplicationRecord,
        source_default: &Domain,
        services: &ServiceCollection,
        routes: &RouteOptions,
        domains: &DestinationDomains,
    ) -> Result<AppCopyResult> {
        let name = record.app.name.as_str();
        self.reporter.step(&format!("copying application {name}"));

        self.remove_existing(name).await?;

        let params = destination_params(&record.app.params, name, &self.dest_space.guid);
        tracing::debug!(app = name, ?params, "creating application at destination");
        let app = record.content.push(self.dest, &params).await?;

        let bound_services = services.app_bindings(name).unwrap_or_default().to_vec();
        for instance_guid in &bound_services {
            tracing::debug!(app = name, instance_guid = %instance_guid, "binding service");
            self.dest
                .bind_service(instance_guid, &app.guid)
                .await
                .with_context(|| format!("binding {name} to service {instance_guid}"))?;
        }

        self.start(&app).await?;

        let mut created = Vec::new();
        let mut skipped = Vec::new();
        for source_route in &record.app.routes {
            match self
                .copy_route(&app, source_route, source_default, routes, domains)
                .await
            {
                Ok(route) => {
                    self.reporter.step(&format!("bound route {}", route.url()));
                    created.push(route.url());
                }
                Err(e) => match e.downcast_ref::<CopyError>() {
                    Some(CopyError::NoMatchingDomain(_)) => {
                        self.reporter
                            .warn(&format!("skipping route {}: {e}", source_route.url()));
                        skipped.push(SkippedRoute {
                            url: source_route.url(),
                            reason: e.to_string(),
                        });
                    }
                    _ => return Err(e),
                },
            }
        }

        Ok(AppCopyResult {
            name: name.to_string(),
            guid: app.guid,
            content_sha256: record.sha256.clone(),
            bound_services,
            routes: created,
            skipped_routes: skipped,
        })
    }

    /// Delete a same-named destination application, its routes and its
    /// service bindings.
    async fn remove_existing(&self, name: &str) -> Result<()> {
        let existing = match self.dest.find_application(name).await {
            Ok(app) => app,
            Err(e) if is_not_found(&e) => return Ok(()),
            Err(e) => return Err(e.context(format!("looking up {name} at destination"))),
        };
        for route in &existing.routes {
            tracing::debug!(app = name, route = %route.url(), "deleting existing route");
            self.dest
                .delete_route(&route.guid)
                .await
                .with_context(|| format!("deleting route {}", route.url()))?;
        }
        let dest = self.dest;
        let guid = existing.guid.as_str();
        retry_with_backoff(self.backoff, "delete application", move || async move {
            dest.delete_application(guid, true).await
        })
        .await
        .with_context(|| format!("deleting existing {name} at destination"))
    }

    /// Request a start until the destination accepts it. On timeout the last
    /// rejection is kept as the cause.
    async fn start(&self, app: &Application) -> Result<()> {
        let dest = self.dest;
        let guid = app.guid.as_str();
        let name = app.name.as_str();
        let last_rejection: RefCell<Option<anyhow::Error>> = RefCell::new(None);
        let rejection = &last_rejection;
        let result = poll_until(self.poll, &format!("starting {name}"), move || async move {
            match dest.update_application_state(guid, AppState::Started).await {
                Ok(()) => Ok(true),
                Err(e) => {
                    tracing::debug!(app = name, error = %format!("{e:#}"), "start not accepted yet");
                    *rejection.borrow_mut() = Some(e);
                    Ok(false)
                }
            }
        })
        .await;
        match (result, last_rejection.into_inner()) {
            (Err(err), Some(cause)) => match err.downcast::<CopyError>() {
                Ok(timeout) => Err(cause.context(timeout)),
                Err(other) => Err(other),
            },
            (result, _) => result,
        }
    }

    async fn copy_route(
        &self,
        app: &Application,
        source_route: &Route,
        source_default: &Domain,
        routes: &RouteOptions,
        domains: &DestinationDomains,
    ) -> Result<Route> {
        let host = match &routes.host_format {
            Some(template) => template.render(&HostVars {
                org: &self.dest_org.name,
                space: &self.dest_space.name,
                app: &app.name,
                host: &source_route.host,
            }),
            None => source_route.host.clone(),
        };

        let domain = match &domains.forced {
            Some(forced) => forced,
            None => match choose_domain(
                &source_route.domain.name,
                &source_default.name,
                &domains.listed,
            ) {
                DomainChoice::DestinationDefault => &domains.default,
                DomainChoice::Matched(found) => found,
                DomainChoice::NoMatch => {
                    return Err(CopyError::NoMatchingDomain(source_route.domain.name.clone()).into());
                }
            },
        };

        match self.dest.find_route(&host, domain).await {
            Ok(stale) => {
                tracing::debug!(route = %stale.url(), "deleting colliding route");
                self.dest
                    .delete_route(&stale.guid)
                    .await
                    .with_context(|| format!("deleting route {}", stale.url()))?;
            }
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(e),
        }

        let route = self
            .dest
            .create_route(&host, domain)
            .await
            .with_context(|| format!("creating route {host}.{}", domain.name))?;
        self.dest
            .bind_route(&route.guid, &app.guid)
            .await
            .with_context(|| format!("binding route {}", route.url()))?;
        Ok(route)
    }

    /// Remove the staging directory and everything downloaded into it.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be removed.
    pub fn close(self) -> Result<()> {
        let path = self.staging.path().to_path_buf();
        self.staging
            .close()
            .with_context(|| format!("removing {}", path.display()))
    }
}
