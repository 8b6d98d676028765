//! `TerminalReporter`: Presentation-layer implementation of `ProgressReporter`.
//!
//! Wraps `&OutputContext` and implements the `application::ports::ProgressReporter`
//! trait so the copy engine can emit progress events without depending on
//! any presentation type directly.

use owo_colors::OwoColorize as _;

use crate::application::ports::ProgressReporter;
use crate::output::OutputContext;

/// Terminal progress reporter that wraps an `OutputContext`.
///
/// - `step()` prints `"  → {message}"` (suppressed when `ctx.quiet`)
/// - `success()` prints `"  ✓ {message}"` (suppressed when `ctx.quiet`)
/// - `warn()` prints `"  ! {message}"` to stderr (never suppressed)
pub struct TerminalReporter<'a> {
    ctx: &'a OutputContext,
}

impl<'a> TerminalReporter<'a> {
    /// Create a new `TerminalReporter` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }
}

impl ProgressReporter for TerminalReporter<'_> {
    fn step(&self, message: &str) {
        tracing::info!("{message}");
        if !self.ctx.quiet {
            println!("  {} {message}", "→".style(self.ctx.styles.info));
        }
    }

    fn success(&self, message: &str) {
        tracing::info!("{message}");
        if !self.ctx.quiet {
            println!("  {} {message}", "✓".style(self.ctx.styles.success));
        }
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{message}");
        eprintln!("  {} {message}", "!".style(self.ctx.styles.warning));
    }
}
