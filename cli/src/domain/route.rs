//! Route host and domain derivation for copied applications.
//!
//! Pure functions only: no I/O, no async.

use anyhow::Result;
use regex::Regex;
use spacecopy_common::Domain;

use crate::domain::error::CopyError;

/// Variables available to a host format, e.g. `"{{.host}}-{{.space}}"`.
pub const HOST_VARIABLES: &[&str] = &["org", "space", "app", "host"];

const PLACEHOLDER: &str = r"\{\{\s*\.?([A-Za-z_][A-Za-z0-9_]*)\s*\}\}";

/// Values substituted into a [`HostTemplate`].
#[derive(Debug, Clone, Copy)]
pub struct HostVars<'a> {
    /// Destination organization name.
    pub org: &'a str,
    /// Destination space name.
    pub space: &'a str,
    /// Application name.
    pub app: &'a str,
    /// Host of the source route.
    pub host: &'a str,
}

impl HostVars<'_> {
    fn get(&self, name: &str) -> Option<&str> {
        match name {
            "org" => Some(self.org),
            "space" => Some(self.space),
            "app" => Some(self.app),
            "host" => Some(self.host),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Var(String),
}

/// A parsed host format.
///
/// Placeholders are written `{{.name}}` (the leading dot and inner whitespace
/// are optional). Only [`HOST_VARIABLES`] may be referenced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTemplate {
    format: String,
    segments: Vec<Segment>,
}

impl HostTemplate {
    /// Parse and validate a host format.
    ///
    /// # Errors
    ///
    /// Returns [`CopyError::InvalidHostFormat`] for unknown variables, stray
    /// braces, or a format without any content.
    pub fn parse(format: &str) -> Result<Self> {
        let invalid = |reason: String| CopyError::InvalidHostFormat {
            format: format.to_string(),
            reason,
        };

        if format.trim().is_empty() {
            return Err(invalid("format is empty".into()).into());
        }

        let re = Regex::new(PLACEHOLDER)?;
        let mut segments = Vec::new();
        let mut last = 0;
        for caps in re.captures_iter(format) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() > last {
                segments.push(Segment::Literal(format[last..whole.start()].to_string()));
            }
            let name = name.as_str();
            if !HOST_VARIABLES.contains(&name) {
                return Err(invalid(format!(
                    "unknown variable '{name}' (valid: {})",
                    HOST_VARIABLES.join(", ")
                ))
                .into());
            }
            segments.push(Segment::Var(name.to_string()));
            last = whole.end();
        }
        if last < format.len() {
            segments.push(Segment::Literal(format[last..].to_string()));
        }

        let stray = segments.iter().any(|s| match s {
            Segment::Literal(text) => text.contains("{{") || text.contains("}}"),
            Segment::Var(_) => false,
        });
        if stray {
            return Err(invalid("unbalanced '{{' or '}}'".into()).into());
        }

        Ok(Self {
            format: format.to_string(),
            segments,
        })
    }

    /// The format string this template was parsed from.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.format
    }

    /// Substitute `vars` into the template.
    #[must_use]
    pub fn render(&self, vars: &HostVars<'_>) -> String {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Literal(text) => text.as_str(),
                Segment::Var(name) => vars.get(name).unwrap_or_default(),
            })
            .collect()
    }
}

/// Leading DNS label of a domain name (`"apps"` for `"apps.example.com"`).
#[must_use]
pub fn first_label(domain: &str) -> &str {
    domain.split('.').next().unwrap_or(domain)
}

/// Where a copied route should live at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainChoice<'a> {
    /// The source route used the source default domain.
    DestinationDefault,
    /// First destination domain sharing the source domain's leading label.
    Matched(&'a Domain),
    /// Nothing suitable; the route is skipped.
    NoMatch,
}

/// Pick the destination domain for a source route domain.
///
/// `candidates` must be in the destination's listing order; the first match
/// wins.
#[must_use]
pub fn choose_domain<'a>(
    source_domain: &str,
    source_default: &str,
    candidates: &'a [Domain],
) -> DomainChoice<'a> {
    if source_domain.eq_ignore_ascii_case(source_default) {
        return DomainChoice::DestinationDefault;
    }
    let label = first_label(source_domain);
    candidates
        .iter()
        .find(|d| first_label(&d.name).eq_ignore_ascii_case(label))
        .map_or(DomainChoice::NoMatch, DomainChoice::Matched)
}
