//! Service instance classification rules.
//!
//! Pure functions only: no I/O, no async.

use spacecopy_common::{ServiceCopyKind, ServiceInstance};

/// How a source service instance is reproduced at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    /// User-provided at source: copied with the same credentials.
    UserProvided,
    /// Managed at source, forced to a user-provided copy carrying the
    /// credentials of a freshly created service key.
    SnapshotAsUserProvided,
    /// Managed at source: recreated from the matching destination plan.
    RecreateManaged,
}

impl From<ServiceKind> for ServiceCopyKind {
    fn from(kind: ServiceKind) -> Self {
        match kind {
            ServiceKind::UserProvided => Self::UserProvided,
            ServiceKind::SnapshotAsUserProvided => Self::SnapshotAsUserProvided,
            ServiceKind::RecreateManaged => Self::RecreateManaged,
        }
    }
}

/// Managed instances to be copied as user-provided services.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsSelection {
    /// Instance names.
    pub names: Vec<String>,
    /// Offering labels; every instance of these offerings is selected.
    pub offering_labels: Vec<String>,
}

impl UpsSelection {
    /// `true` when `instance` is selected by name or by offering label.
    #[must_use]
    pub fn selects(&self, instance: &ServiceInstance) -> bool {
        self.names.iter().any(|n| n == &instance.name)
            || instance
                .offering
                .as_ref()
                .is_some_and(|o| self.offering_labels.iter().any(|l| l == &o.label))
    }
}

/// Decide the copy strategy of a source instance.
#[must_use]
pub fn classify(instance: &ServiceInstance, force_ups: &UpsSelection) -> ServiceKind {
    if instance.user_provided && !instance.has_catalog_identity() {
        ServiceKind::UserProvided
    } else if force_ups.selects(instance) {
        ServiceKind::SnapshotAsUserProvided
    } else {
        ServiceKind::RecreateManaged
    }
}

/// Name of the source service key used to snapshot an instance for a given
/// destination. Stable across runs so a re-run can find and replace it.
#[must_use]
pub fn snapshot_key_name(instance: &str, target: &str, org: &str, space: &str) -> String {
    format!("__{instance}_copy_for_/{target}/{org}/{space}")
}

/// The applications of `selected` that appear in `bound`, in `bound` order.
#[must_use]
pub fn selected_bound_apps(selected: &[String], bound: &[String]) -> Vec<String> {
    bound
        .iter()
        .filter(|name| selected.contains(name))
        .cloned()
        .collect()
}
