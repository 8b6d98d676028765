//! Infrastructure layer: concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: the control-plane HTTP
//! session, cf CLI config and saved-target discovery, and the YAML settings
//! store.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::commands` or `crate::output` are forbidden.

pub mod cf_config;
pub mod cloud_controller;
pub mod config;
pub mod targets;
