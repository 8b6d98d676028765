//! Command implementations

pub mod config;
pub mod copy;
pub mod version;
