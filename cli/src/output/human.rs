//! Human-readable terminal renderer.

use owo_colors::OwoColorize as _;
use spacecopy_common::{ContextRef, CopySummary, ServiceCopyKind};

use crate::domain::config::CopyConfig;
use crate::output::OutputContext;

/// Renders copy plans and results as human-readable terminal output.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    /// Create a new `HumanRenderer` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    /// Render the CLI version information.
    pub fn render_version(&self, version: &str) {
        if self.ctx.quiet {
            return;
        }
        self.ctx.info(&format!("spacecopy v{version}"));
    }

    /// Render the source → destination header of a copy run.
    pub fn render_plan(&self, source: &ContextRef, destination: &ContextRef) {
        if self.ctx.quiet {
            return;
        }
        println!();
        println!(
            "  {} {} {}",
            context_label(source).style(self.ctx.styles.source),
            "→".style(self.ctx.styles.dim),
            context_label(destination).style(self.ctx.styles.destination),
        );
        println!();
    }

    /// Render the outcome of a copy run.
    pub fn render_summary(&self, summary: &CopySummary) {
        if self.ctx.quiet {
            return;
        }
        println!();
        self.ctx.header("Services:");
        if summary.services.is_empty() {
            self.ctx.kv("", "(none)");
        }
        for service in &summary.services {
            let how = match service.kind {
                ServiceCopyKind::UserProvided => "user-provided",
                ServiceCopyKind::SnapshotAsUserProvided => "snapshot as user-provided",
                ServiceCopyKind::RecreateManaged => "managed",
            };
            let reused = if service.reused { ", kept existing" } else { "" };
            self.ctx
                .kv(&format!("{:<24}", service.name), &format!("{how}{reused}"));
        }

        println!();
        self.ctx.header("Applications:");
        if summary.applications.is_empty() {
            self.ctx.kv("", "(none)");
        }
        for app in &summary.applications {
            let routes = if app.routes.is_empty() {
                "no routes".to_string()
            } else {
                app.routes.join(", ")
            };
            self.ctx.kv(&format!("{:<24}", app.name), &routes);
            for skipped in &app.skipped_routes {
                self.ctx
                    .warn(&format!("{}: route {} skipped ({})", app.name, skipped.url, skipped.reason));
            }
        }

        let elapsed = summary.finished_at - summary.started_at;
        println!();
        self.ctx.success(&format!(
            "Copied {} services and {} applications to {} in {}s",
            summary.services.len(),
            summary.applications.len(),
            context_label(&summary.destination),
            elapsed.num_seconds(),
        ));
    }

    /// Render the current spacecopy configuration.
    pub fn render_config(&self, config: &CopyConfig, path: &std::path::Path) {
        println!();
        println!(
            "  {}",
            format!("Configuration ({})", path.display()).style(self.ctx.styles.header)
        );
        println!();
        println!("  {:<26} {}", "retry.attempts:", config.retry.attempts);
        println!("  {:<26} {}", "retry.base_delay_ms:", config.retry.base_delay_ms);
        println!("  {:<26} {}", "start.timeout_secs:", config.start.timeout_secs);
        println!("  {:<26} {}", "start.poll_interval_ms:", config.start.poll_interval_ms);
        println!("  {:<26} {}", "http.timeout_secs:", config.http.timeout_secs);
        println!();
        println!("  {}", "Environment:".style(self.ctx.styles.bold));
        for var in ["SPACECOPY_CONFIG", "CF_HOME", "NO_COLOR"] {
            println!(
                "    {:<18} {}",
                format!("{var}:"),
                std::env::var(var).unwrap_or_else(|_| "(not set)".to_string())
            );
        }
        println!();
    }
}

/// `target/org/space`.
#[must_use]
pub fn context_label(ctx: &ContextRef) -> String {
    format!("{}/{}/{}", ctx.target, ctx.org, ctx.space)
}
