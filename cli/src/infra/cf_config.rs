//! Reading of the cf CLI `config.json`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::Engine as _;
use serde::Deserialize;
use spacecopy_common::{OrgRef, SpaceRef};

/// `{GUID, Name}` pair as stored by the cf CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CfFields {
    #[serde(rename = "GUID", default)]
    pub guid: String,
    #[serde(rename = "Name", default)]
    pub name: String,
}

/// The parts of a cf CLI config file a session needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CfConfig {
    /// Control-plane API endpoint.
    pub target: String,
    pub uaa_endpoint: String,
    pub authorization_endpoint: String,
    /// `"bearer <jwt>"`.
    pub access_token: String,
    pub refresh_token: String,
    #[serde(rename = "UAAOAuthClient")]
    pub uaa_oauth_client: String,
    #[serde(rename = "UAAOAuthClientSecret")]
    pub uaa_oauth_client_secret: String,
    #[serde(rename = "SSLDisabled")]
    pub ssl_disabled: bool,
    pub organization_fields: CfFields,
    pub space_fields: CfFields,
}

impl CfConfig {
    /// Parse a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("cannot parse {}", path.display()))?;
        if config.target.is_empty() {
            anyhow::bail!("no API endpoint set in {}; run 'cf login' first", path.display());
        }
        Ok(config)
    }

    #[must_use]
    pub fn org(&self) -> OrgRef {
        OrgRef {
            guid: self.organization_fields.guid.clone(),
            name: self.organization_fields.name.clone(),
        }
    }

    #[must_use]
    pub fn space(&self) -> SpaceRef {
        SpaceRef {
            guid: self.space_fields.guid.clone(),
            name: self.space_fields.name.clone(),
        }
    }

    /// UAA endpoint used for token refresh.
    #[must_use]
    pub fn token_endpoint(&self) -> &str {
        if self.uaa_endpoint.is_empty() {
            &self.authorization_endpoint
        } else {
            &self.uaa_endpoint
        }
    }

    /// OAuth client id, `cf` when unset.
    #[must_use]
    pub fn oauth_client(&self) -> &str {
        if self.uaa_oauth_client.is_empty() {
            "cf"
        } else {
            &self.uaa_oauth_client
        }
    }

    /// `user_name` claim of the access token, empty if it cannot be read.
    #[must_use]
    pub fn username(&self) -> String {
        token_username(&self.access_token).unwrap_or_default()
    }
}

fn token_username(token: &str) -> Option<String> {
    let jwt = token
        .strip_prefix("bearer ")
        .or_else(|| token.strip_prefix("Bearer "))
        .unwrap_or(token);
    let payload = jwt.split('.').nth(1)?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims
        .get("user_name")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
}

/// Default cf CLI config path: `$CF_HOME/.cf/config.json`, falling back to the
/// home directory.
///
/// # Errors
///
/// Returns an error if no home directory can be determined.
pub fn default_config_path() -> Result<PathBuf> {
    let home = match std::env::var_os("CF_HOME") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?,
    };
    Ok(home.join(".cf").join("config.json"))
}
