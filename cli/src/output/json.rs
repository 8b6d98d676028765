//! JSON output helpers.
//!
//! Every `--json` code path prints exactly one pretty-printed document on
//! stdout: the run summary, the configuration, or an error object.

use anyhow::{Context, Result};
use spacecopy_common::CopySummary;

use crate::domain::config::CopyConfig;

/// Format a JSON error object.
///
/// Output (pretty-printed):
/// ```json
/// {
///   "error": true,
///   "message": "...",
///   "code": "..."
/// }
/// ```
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_error(message: &str, code: &str) -> Result<String> {
    let obj = serde_json::json!({
        "error": true,
        "message": message,
        "code": code,
    });
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}

/// Format the report of a copy run.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_summary(summary: &CopySummary) -> Result<String> {
    serde_json::to_string_pretty(summary).context("JSON serialization failed")
}

/// Format the effective configuration together with its file location.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_config(config: &CopyConfig, path: &std::path::Path) -> Result<String> {
    let obj = serde_json::json!({
        "path": path.display().to_string(),
        "config": config,
    });
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}
