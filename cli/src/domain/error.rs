//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use thiserror::Error;

// ── Copy errors ───────────────────────────────────────────────────────────────

/// Errors raised while planning or executing a copy.
#[derive(Debug, Error)]
pub enum CopyError {
    /// A lookup found nothing. Used to decide between create and delete-first.
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("The application '{0}' does not exist.")]
    AppNotFound(String),

    #[error("A target named '{0}' cannot be found.")]
    TargetNotFound(String),

    #[error("The CLI target org and space needs to be set.")]
    NoTarget,

    #[error("The source and destination are the same.")]
    SameSourceAndDestination,

    #[error("no matching plan for offering '{offering}' name '{plan}'")]
    NoMatchingPlan { offering: String, plan: String },

    #[error("no domain at destination matches '{0}'")]
    NoMatchingDomain(String),

    #[error("{what} did not complete within {secs}s")]
    Timeout { what: String, secs: u64 },

    #[error("Invalid host format '{format}': {reason}")]
    InvalidHostFormat { format: String, reason: String },
}

impl CopyError {
    /// Shorthand for [`CopyError::NotFound`].
    #[must_use]
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Stable machine-readable code used in JSON error output.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AppNotFound(_) => "APP_NOT_FOUND",
            Self::TargetNotFound(_) => "TARGET_NOT_FOUND",
            Self::NoTarget => "NO_TARGET",
            Self::SameSourceAndDestination => "SAME_SOURCE_AND_DESTINATION",
            Self::NoMatchingPlan { .. } => "NO_MATCHING_PLAN",
            Self::NoMatchingDomain(_) => "NO_MATCHING_DOMAIN",
            Self::Timeout { .. } => "TIMEOUT",
            Self::InvalidHostFormat { .. } => "INVALID_HOST_FORMAT",
        }
    }
}

/// JSON error code for any error: the first typed error in the chain decides.
/// A [`CopyError`] attached as context to another error counts too.
#[must_use]
pub fn error_code(err: &anyhow::Error) -> &'static str {
    if let Some(e) = err.downcast_ref::<CopyError>() {
        return e.code();
    }
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<CopyError>() {
            return e.code();
        }
        if cause.downcast_ref::<ConfigError>().is_some() {
            return "INVALID_CONFIG";
        }
    }
    "ERROR"
}

/// Returns `true` if `err` (or anything in its chain) is a [`CopyError::NotFound`].
#[must_use]
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<CopyError>(),
            Some(CopyError::NotFound { .. })
        )
    })
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to configuration key/value validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown setting: {key}\n\nValid settings: {valid}")]
    UnknownKey { key: String, valid: String },

    #[error("Invalid value for {key}: {value}\n\nValid values: {valid}")]
    InvalidValue {
        key: String,
        value: String,
        valid: String,
    },
}
