//! Platform resource models shared between the CLI engine and its session
//! implementations.
//!
//! Field names follow the control-plane v2 JSON so `AppParams` can be sent
//! as a request body unchanged.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Free-form credential document carried by service instances and keys.
pub type Credentials = serde_json::Map<String, serde_json::Value>;

// ── Organization / space ─────────────────────────────────────────────────────

/// Organization identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgRef {
    pub guid: String,
    pub name: String,
}

/// Space identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceRef {
    pub guid: String,
    pub name: String,
}

// ── Applications ─────────────────────────────────────────────────────────────

/// Desired application state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AppState {
    Started,
    Stopped,
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => f.write_str("STARTED"),
            Self::Stopped => f.write_str("STOPPED"),
        }
    }
}

/// Returned when an application state string is not recognised.
#[derive(Debug, Error)]
#[error("unknown application state '{0}'")]
pub struct ParseStateError(String);

impl FromStr for AppState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STARTED" => Ok(Self::Started),
            "STOPPED" => Ok(Self::Stopped),
            _ => Err(ParseStateError(s.to_string())),
        }
    }
}

/// Creation/update attributes of an application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_guid: Option<String>,
    /// Buildpack name or git url.
    #[serde(default, rename = "buildpack", skip_serializing_if = "Option::is_none")]
    pub buildpack_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_quota: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instances: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_json: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_timeout: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_http_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_ssh: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<AppState>,
}

/// A deployed application together with the routes mapped to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub guid: String,
    pub name: String,
    /// Attributes as reported by the platform.
    pub params: AppParams,
    #[serde(default)]
    pub routes: Vec<Route>,
    /// Names of service instances bound to the application.
    #[serde(default)]
    pub service_names: Vec<String>,
}

/// Which payload of an application to transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// The uploaded application source package.
    Bits,
    /// The staged, runnable build artifact.
    Droplet,
}

// ── Routing ──────────────────────────────────────────────────────────────────

/// A shared or private routing domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub guid: String,
    pub name: String,
    #[serde(default)]
    pub shared: bool,
}

/// A host + domain (+ path) mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub guid: String,
    pub host: String,
    pub domain: Domain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Route {
    /// `host.domain/path` as shown to users.
    #[must_use]
    pub fn url(&self) -> String {
        let mut url = if self.host.is_empty() {
            self.domain.name.clone()
        } else {
            format!("{}.{}", self.host, self.domain.name)
        };
        if let Some(path) = self.path.as_deref().filter(|p| !p.is_empty()) {
            if !path.starts_with('/') {
                url.push('/');
            }
            url.push_str(path);
        }
        url
    }
}

// ── Services ─────────────────────────────────────────────────────────────────

/// Plan reference of a managed service instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePlanRef {
    pub guid: String,
    pub name: String,
}

/// Offering (catalog service) reference of a managed service instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOfferingRef {
    pub guid: String,
    pub label: String,
}

/// A binding between a service instance and an application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceBinding {
    pub guid: String,
    pub app_guid: String,
}

/// A platform-issued credential snapshot for a service instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceKey {
    pub guid: String,
    pub name: String,
    #[serde(default)]
    pub credentials: Credentials,
}

/// A service instance as seen in a space.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub guid: String,
    pub name: String,
    /// `true` for user-provided instances.
    #[serde(default)]
    pub user_provided: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<ServicePlanRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offering: Option<ServiceOfferingRef>,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Names of the applications bound to the instance.
    #[serde(default)]
    pub application_names: Vec<String>,
    #[serde(default)]
    pub bindings: Vec<ServiceBinding>,
    #[serde(default)]
    pub keys: Vec<ServiceKey>,
}

impl ServiceInstance {
    /// `true` when the instance carries a catalog plan or offering identity.
    #[must_use]
    pub fn has_catalog_identity(&self) -> bool {
        self.plan.as_ref().is_some_and(|p| !p.guid.is_empty())
            || self.offering.as_ref().is_some_and(|o| !o.guid.is_empty())
    }
}

/// A user-provided service and the data needed to recreate it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProvidedService {
    #[serde(default)]
    pub guid: String,
    pub name: String,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syslog_drain_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_service_url: Option<String>,
}

/// A catalog service offering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOffering {
    pub guid: String,
    pub label: String,
}

/// A plan of a catalog service offering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePlan {
    pub guid: String,
    pub name: String,
    pub offering_guid: String,
}
