//! Unit tests for the spacecopy CLI
//!
//! These tests drive the copy engine against in-memory platform sessions and
//! run fast without network access.

mod applications_manager;
mod architecture;
mod property_tests;
