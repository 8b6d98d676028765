//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` and the shared model crate,
//! never from `crate::infra`, `crate::commands`, or `crate::output`.
//!
//! Lookups that find nothing fail with [`crate::domain::CopyError::NotFound`];
//! callers use [`crate::domain::is_not_found`] to tell it apart from real
//! failures.

use std::path::{Path, PathBuf};

use anyhow::Result;
use spacecopy_common::{
    AppParams, AppState, Application, ContentKind, Domain, OrgRef, Route, ServiceInstance,
    ServiceKey, ServiceOffering, ServicePlan, SpaceRef, UserProvidedService,
};

use crate::domain::config::CopyConfig;
use crate::domain::error::CopyError;

// ── Session Context ───────────────────────────────────────────────────────────

/// The org and space a session operates in, plus the identity behind it.
pub trait SessionContext {
    /// Name of the platform target the session talks to.
    fn target(&self) -> &str;
    /// Logged-in user name.
    fn username(&self) -> &str;
    /// Current organization.
    fn org(&self) -> &OrgRef;
    /// Current space.
    fn space(&self) -> &SpaceRef;
    /// Switch the session to another org and space.
    fn set_context(&mut self, org: OrgRef, space: SpaceRef);
    /// `true` when both an org and a space are targeted.
    fn has_target(&self) -> bool {
        !self.org().guid.is_empty() && !self.space().guid.is_empty()
    }
}

/// Organization and space lookup.
#[allow(async_fn_in_trait)]
pub trait OrgDirectory {
    /// Find an organization by name.
    async fn find_org(&self, name: &str) -> Result<OrgRef>;
    /// Find a space by name inside `org`.
    async fn find_space(&self, org: &OrgRef, name: &str) -> Result<SpaceRef>;
}

// ── Service Ports ─────────────────────────────────────────────────────────────

/// Service instances, user-provided services and the service catalog.
#[allow(async_fn_in_trait)]
pub trait ServiceRepository {
    /// All service instances of the current space with the names of the
    /// applications bound to them.
    async fn service_instances(&self) -> Result<Vec<ServiceInstance>>;
    /// Full detail of one instance in the current space, including its
    /// bindings and service keys.
    async fn find_service_instance(&self, name: &str) -> Result<ServiceInstance>;
    /// User-provided services of the current space with their credentials.
    async fn user_provided_services(&self) -> Result<Vec<UserProvidedService>>;
    /// Create a user-provided service in the current space.
    async fn create_user_provided_service(&self, service: &UserProvidedService) -> Result<()>;
    /// Create a managed service instance in the current space.
    async fn create_service_instance(
        &self,
        name: &str,
        plan_guid: &str,
        params: &serde_json::Map<String, serde_json::Value>,
        tags: &[String],
    ) -> Result<()>;
    /// Delete a service instance (managed or user-provided).
    async fn delete_service_instance(&self, instance: &ServiceInstance) -> Result<()>;
    /// Offerings with `label` visible to the current space, in listing order.
    async fn find_offerings_by_label(&self, label: &str) -> Result<Vec<ServiceOffering>>;
    /// Plans of an offering, in listing order.
    async fn plans_for_offering(&self, offering_guid: &str) -> Result<Vec<ServicePlan>>;
}

/// Service keys.
#[allow(async_fn_in_trait)]
pub trait ServiceKeyRepository {
    /// Create a key named `name` for an instance.
    async fn create_service_key(&self, instance_guid: &str, name: &str) -> Result<()>;
    /// Read a key back, including its generated credentials.
    async fn get_service_key(&self, instance_guid: &str, name: &str) -> Result<ServiceKey>;
    /// Delete a key.
    async fn delete_service_key(&self, key_guid: &str) -> Result<()>;
}

/// Bindings between applications and service instances.
#[allow(async_fn_in_trait)]
pub trait BindingRepository {
    /// Bind an application to a service instance.
    async fn bind_service(&self, instance_guid: &str, app_guid: &str) -> Result<()>;
    /// Remove the binding between an application and a service instance.
    async fn unbind_service(&self, instance_guid: &str, app_guid: &str) -> Result<()>;
}

// ── Application Ports ─────────────────────────────────────────────────────────

/// Applications of the current space.
#[allow(async_fn_in_trait)]
pub trait ApplicationRepository {
    /// Every application of the current space with routes and bound service
    /// names, in listing order.
    async fn applications(&self) -> Result<Vec<Application>>;
    /// One application of the current space by name.
    async fn find_application(&self, name: &str) -> Result<Application>;
    /// Create an application shell.
    async fn create_application(&self, params: &AppParams) -> Result<Application>;
    /// Request a state transition.
    async fn update_application_state(&self, app_guid: &str, state: AppState) -> Result<()>;
    /// Delete an application. A `recursive` delete also removes its service
    /// bindings; otherwise an application with bindings is refused.
    async fn delete_application(&self, app_guid: &str, recursive: bool) -> Result<()>;
}

/// Routes.
#[allow(async_fn_in_trait)]
pub trait RouteRepository {
    /// Find the route `host.domain`.
    async fn find_route(&self, host: &str, domain: &Domain) -> Result<Route>;
    /// Create `host.domain` in the current space.
    async fn create_route(&self, host: &str, domain: &Domain) -> Result<Route>;
    /// Map a route to an application.
    async fn bind_route(&self, route_guid: &str, app_guid: &str) -> Result<()>;
    /// Delete a route.
    async fn delete_route(&self, route_guid: &str) -> Result<()>;
}

/// Routing domains.
#[allow(async_fn_in_trait)]
pub trait DomainRepository {
    /// The default routing domain of the current org.
    async fn default_domain(&self) -> Result<Domain>;
    /// Shared then private domains of the current org, in listing order.
    async fn domains(&self) -> Result<Vec<Domain>>;
    /// A domain visible to the current org, by name.
    async fn find_domain(&self, name: &str) -> Result<Domain> {
        self.domains()
            .await?
            .into_iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| CopyError::not_found("domain", name).into())
    }
}

// ── Content Transfer Port ─────────────────────────────────────────────────────

/// Application payload transport.
#[allow(async_fn_in_trait)]
pub trait ContentTransfer {
    /// Download the payload of an application into `dest`, which must not
    /// exist yet. Returns the number of bytes written.
    async fn download_content(&self, app_guid: &str, kind: ContentKind, dest: &Path)
    -> Result<u64>;
    /// Upload a zipped source package as the application's bits.
    async fn upload_bits(&self, app_guid: &str, archive: &Path) -> Result<()>;
    /// Upload a staged droplet.
    async fn upload_droplet(&self, app_guid: &str, droplet: &Path) -> Result<()>;
}

/// Composite trait: everything the copy engine needs from one side.
pub trait PlatformSession:
    SessionContext
    + OrgDirectory
    + ServiceRepository
    + ServiceKeyRepository
    + BindingRepository
    + ApplicationRepository
    + RouteRepository
    + DomainRepository
    + ContentTransfer
{
}

/// Blanket implementation: any type implementing all sub-traits is a `PlatformSession`.
impl<T> PlatformSession for T where
    T: SessionContext
        + OrgDirectory
        + ServiceRepository
        + ServiceKeyRepository
        + BindingRepository
        + ApplicationRepository
        + RouteRepository
        + DomainRepository
        + ContentTransfer
{
}

// ── Session Discovery Ports ───────────────────────────────────────────────────

/// Saved platform targets (one CLI config file per target).
#[cfg_attr(test, mockall::automock)]
pub trait TargetRegistry {
    /// Name of the target the CLI is currently pointed at.
    ///
    /// # Errors
    ///
    /// Returns an error when no target is selected.
    fn current_target(&self) -> Result<String>;
    /// Path of the CLI config file for a target.
    ///
    /// # Errors
    ///
    /// Returns [`CopyError::TargetNotFound`] for unknown targets.
    fn config_path(&self, name: &str) -> Result<PathBuf>;
}

/// Opens authenticated sessions.
#[allow(async_fn_in_trait)]
pub trait SessionProvider {
    type Session: PlatformSession;

    /// Open a session for a saved target, or for the current CLI config when
    /// `target` is `None`.
    async fn open(&self, target: Option<&str>) -> Result<Self::Session>;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}

// ── Configuration Port ────────────────────────────────────────────────────────

/// Abstracts loading and saving of `~/.spacecopy/config.yaml`.
pub trait ConfigStore {
    /// Load the configuration, falling back to defaults when no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    fn load(&self) -> Result<CopyConfig>;
    /// Persist the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    fn save(&self, config: &CopyConfig) -> Result<()>;
    /// Location of the configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    fn path(&self) -> Result<PathBuf>;
}
