//! Source and destination of a copy run.

use anyhow::Result;
use spacecopy_common::ContextRef;

use crate::domain::error::CopyError;

/// Resolved source and destination contexts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyContext {
    pub source: ContextRef,
    pub destination: ContextRef,
}

impl CopyContext {
    /// Build the destination from the positional arguments, falling back to
    /// the source org and target when they are omitted.
    ///
    /// # Errors
    ///
    /// Returns [`CopyError::SameSourceAndDestination`] when nothing would move.
    pub fn resolve(
        source: ContextRef,
        dest_space: &str,
        dest_org: Option<&str>,
        dest_target: Option<&str>,
    ) -> Result<Self> {
        let destination = ContextRef {
            target: dest_target.unwrap_or(&source.target).to_string(),
            org: dest_org.unwrap_or(&source.org).to_string(),
            space: dest_space.to_string(),
        };
        if destination == source {
            return Err(CopyError::SameSourceAndDestination.into());
        }
        Ok(Self {
            source,
            destination,
        })
    }

    /// `true` when the destination lives behind another API endpoint.
    #[must_use]
    pub fn crosses_targets(&self) -> bool {
        self.source.target != self.destination.target
    }
}
