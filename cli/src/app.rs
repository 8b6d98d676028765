//! Application context: unified state passed to every command handler.

use anyhow::Result;

use crate::infra::config::YamlConfigStore;
use crate::output::OutputContext;

/// Output rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable terminal output (default).
    Human,
    /// Machine-readable JSON output.
    Json,
}

/// Output rendering flags.
pub struct OutputFlags {
    /// Disable ANSI color output.
    pub no_color: bool,
    /// Suppress non-error output.
    pub quiet: bool,
    /// Enable JSON output mode.
    pub json: bool,
}

/// Behaviour flags.
pub struct BehaviourFlags {
    /// Skip interactive prompts (also set by `CI` / `SPACECOPY_YES` env vars).
    pub yes: bool,
}

/// Flags passed from the top-level CLI to `AppContext::new`.
pub struct AppFlags {
    /// Output rendering options.
    pub output: OutputFlags,
    /// Behaviour options.
    pub behaviour: BehaviourFlags,
}

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context (colors, quiet mode).
    pub output: OutputContext,
    /// Output rendering mode (human vs JSON).
    pub mode: OutputMode,
    /// Settings file store.
    pub config_store: YamlConfigStore,
    /// When `true`, skip interactive prompts and use defaults.
    ///
    /// Set when `--yes` / `-y` is passed, or when the `CI` or `SPACECOPY_YES`
    /// environment variables are present.
    pub non_interactive: bool,
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags.
    ///
    /// JSON mode silences progress output so stdout carries one document.
    #[must_use]
    pub fn new(flags: &AppFlags) -> Self {
        let ci_env = std::env::var("CI").is_ok() || std::env::var("SPACECOPY_YES").is_ok();
        let non_interactive = flags.behaviour.yes || ci_env;

        let mode = if flags.output.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        };

        Self {
            output: OutputContext::new(
                flags.output.no_color,
                flags.output.quiet || flags.output.json,
            ),
            mode,
            config_store: YamlConfigStore,
            non_interactive,
        }
    }

    /// Returns `true` when JSON output mode is active.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    /// Ask the user for confirmation.
    ///
    /// When `non_interactive` is `true` (CI, `--yes` flag, or `SPACECOPY_YES`
    /// env), returns `default` immediately without prompting.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal prompt fails (e.g. no TTY available).
    pub fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        if self.non_interactive {
            return Ok(default);
        }
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()?;
        Ok(confirmed)
    }
}
