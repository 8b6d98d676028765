//! Application payload strategies.
//!
//! A copied application carries either its uploaded source package (bits)
//! or its staged droplet. Both variants download into the run's staging
//! directory and, on push, create the destination shell before uploading.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use spacecopy_common::{AppParams, Application, ContentKind};

use crate::application::ports::{ApplicationRepository, ContentTransfer};

/// Payload of one source application, staged on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppContent {
    /// Zipped source package, re-staged at the destination.
    Bits { app_guid: String, path: PathBuf },
    /// Staged droplet, uploaded as a prebuilt artifact.
    Droplet { app_guid: String, path: PathBuf },
}

impl AppContent {
    /// Handle for `app` staged under `staging_dir`.
    #[must_use]
    pub fn new(app: &Application, staging_dir: &Path, kind: ContentKind) -> Self {
        let app_guid = app.guid.clone();
        match kind {
            ContentKind::Bits => Self::Bits {
                app_guid,
                path: staging_dir.join(format!("{}.zip", app.name)),
            },
            ContentKind::Droplet => Self::Droplet {
                app_guid,
                path: staging_dir.join(format!("{}.tgz", app.name)),
            },
        }
    }

    #[must_use]
    pub fn kind(&self) -> ContentKind {
        match self {
            Self::Bits { .. } => ContentKind::Bits,
            Self::Droplet { .. } => ContentKind::Droplet,
        }
    }

    /// Local staging file.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Bits { path, .. } | Self::Droplet { path, .. } => path,
        }
    }

    fn source_guid(&self) -> &str {
        match self {
            Self::Bits { app_guid, .. } | Self::Droplet { app_guid, .. } => app_guid,
        }
    }

    /// Download the payload from the source session. Returns the byte count.
    ///
    /// # Errors
    ///
    /// Fails if the staging file already exists or the download fails.
    pub async fn fetch(&self, source: &impl ContentTransfer) -> Result<u64> {
        let path = self.path();
        if path.exists() {
            anyhow::bail!("staging file {} already exists", path.display());
        }
        source
            .download_content(self.source_guid(), self.kind(), path)
            .await
            .with_context(|| format!("downloading {}", path.display()))
    }

    /// Create the destination application from `params`, then upload the
    /// staged payload to it.
    ///
    /// # Errors
    ///
    /// Fails if the shell cannot be created or the upload fails. The shell is
    /// left in place when the upload fails.
    pub async fn push<S>(&self, dest: &S, params: &AppParams) -> Result<Application>
    where
        S: ApplicationRepository + ContentTransfer,
    {
        let app = dest
            .create_application(params)
            .await
            .context("creating application")?;
        tracing::debug!(app = %app.name, guid = %app.guid, kind = ?self.kind(), "uploading payload");
        match self {
            Self::Bits { path, .. } => dest
                .upload_bits(&app.guid, path)
                .await
                .with_context(|| format!("uploading bits of {}", app.name))?,
            Self::Droplet { path, .. } => dest
                .upload_droplet(&app.guid, path)
                .await
                .with_context(|| format!("uploading droplet of {}", app.name))?,
        }
        Ok(app)
    }

    /// SHA-256 of the staged payload, hex encoded. The file is read on the
    /// blocking pool.
    ///
    /// # Errors
    ///
    /// Fails if the staging file cannot be read.
    pub async fn sha256(&self) -> Result<String> {
        let path = self.path().to_path_buf();
        tokio::task::spawn_blocking(move || sha256_file(&path))
            .await
            .context("hashing task failed")?
    }
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut file =
        std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 65536];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("reading {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(char::from(HEX[(b >> 4) as usize]));
        out.push(char::from(HEX[(b & 0xf) as usize]));
    }
    out
}
