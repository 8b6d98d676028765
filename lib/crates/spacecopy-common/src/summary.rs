//! Machine-readable report of a copy run (`--json` output).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Target + organization + space triple.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRef {
    pub target: String,
    pub org: String,
    pub space: String,
}

/// How a service instance was reproduced at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceCopyKind {
    /// User-provided at source, copied with the same credentials.
    UserProvided,
    /// Managed at source, copied as user-provided with service key credentials.
    SnapshotAsUserProvided,
    /// Managed at source, recreated from the matching destination plan.
    RecreateManaged,
}

/// Outcome for one service instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCopyResult {
    pub name: String,
    pub kind: ServiceCopyKind,
    /// Guid of the instance at the destination.
    pub guid: String,
    /// `true` when an existing same-named instance was kept instead of recreated.
    #[serde(default)]
    pub reused: bool,
}

/// A source route that could not be recreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRoute {
    pub url: String,
    pub reason: String,
}

/// Outcome for one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppCopyResult {
    pub name: String,
    /// Guid of the application at the destination.
    pub guid: String,
    /// SHA-256 of the transferred payload archive.
    pub content_sha256: String,
    /// Destination service instance guids the application was bound to.
    pub bound_services: Vec<String>,
    /// Routes created at the destination.
    pub routes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_routes: Vec<SkippedRoute>,
}

/// Full report of a copy run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopySummary {
    pub source: ContextRef,
    pub destination: ContextRef,
    pub services: Vec<ServiceCopyResult>,
    pub applications: Vec<AppCopyResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
