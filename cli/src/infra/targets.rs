//! Saved targets in the layout of the cf `targets` plugin:
//! `~/.cf/targets/<name>.config.json` plus a `current` symlink.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::application::ports::TargetRegistry;
use crate::domain::error::CopyError;
use crate::infra::cf_config::default_config_path;

const CURRENT: &str = "current";

/// Target registry backed by the targets plugin directory.
#[derive(Debug, Clone)]
pub struct TargetsPluginInfo {
    default_config: PathBuf,
    targets_dir: PathBuf,
    suffix: String,
    targets: BTreeMap<String, PathBuf>,
}

impl TargetsPluginInfo {
    /// Registry next to the default cf CLI config.
    ///
    /// # Errors
    ///
    /// Returns an error if the default config path cannot be determined.
    pub fn discover() -> Result<Self> {
        Self::for_config(&default_config_path()?)
    }

    /// Registry next to `default_config`. A missing targets directory yields
    /// an empty registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the targets directory exists but cannot be read.
    pub fn for_config(default_config: &Path) -> Result<Self> {
        let base = default_config.parent().unwrap_or_else(|| Path::new("."));
        let file_name = default_config
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "config.json".to_string());
        let mut info = Self {
            default_config: default_config.to_path_buf(),
            targets_dir: base.join("targets"),
            suffix: format!(".{file_name}"),
            targets: BTreeMap::new(),
        };
        info.scan()?;
        Ok(info)
    }

    fn scan(&mut self) -> Result<()> {
        if !self.targets_dir.is_dir() {
            return Ok(());
        }
        let entries = std::fs::read_dir(&self.targets_dir)
            .with_context(|| format!("cannot read {}", self.targets_dir.display()))?;
        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if let Some(name) = file_name.strip_suffix(&self.suffix) {
                self.targets.insert(name.to_string(), entry.path());
            }
        }
        tracing::debug!(dir = %self.targets_dir.display(), count = self.targets.len(), "saved targets");
        Ok(())
    }

    /// Names of all saved targets.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }
}

impl TargetRegistry for TargetsPluginInfo {
    fn current_target(&self) -> Result<String> {
        let link = self.targets_dir.join(CURRENT);
        let resolved = std::fs::canonicalize(&link)
            .with_context(|| format!("no current target at {}", link.display()))?;
        let file_name = resolved
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(file_name
            .strip_suffix(&self.suffix)
            .unwrap_or(&file_name)
            .to_string())
    }

    fn config_path(&self, name: &str) -> Result<PathBuf> {
        if self.current_target().ok().as_deref() == Some(name) {
            return Ok(self.default_config.clone());
        }
        self.targets.get(name).cloned().ok_or_else(|| {
            tracing::debug!(available = ?self.names().collect::<Vec<_>>(), "unknown target");
            CopyError::TargetNotFound(name.to_string()).into()
        })
    }
}
