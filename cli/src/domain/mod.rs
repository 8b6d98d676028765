//! Domain layer: pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod app;
pub mod config;
pub mod context;
pub mod error;
pub mod route;
pub mod service;

pub use config::{CopyConfig, apply_config_value, validate_config_key, validate_config_value};
pub use context::CopyContext;
pub use error::{ConfigError, CopyError, error_code, is_not_found};
pub use route::{DomainChoice, HostTemplate, HostVars, choose_domain};
pub use service::{ServiceKind, UpsSelection, classify};
