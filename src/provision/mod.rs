//! External tool provisioning
//!
//! The extraction tool (`yt-dlp`) and the transcoder (`ffmpeg`) live under
//! `<install_root>/bin`:
//!
//! ```text
//! bin/
//! ├── yt-dlp            (yt-dlp.exe on Windows)
//! ├── ffmpeg.zip        downloaded transcoder archive
//! └── ffmpeg/           unpacked archive, contains the transcoder bin dir
//! ```
//!
//! [`ToolProvisioner::ensure`] fills in whatever is missing and is a no-op when
//! everything is already in place.

mod fetch;
mod unpack;

use crate::config::{RetryConfig, ToolsConfig};
use crate::error::{ProvisioningError, Result};
use crate::retry::download_with_retry;
use crate::types::ToolSet;
use crate::utils::{get_available_space, make_executable};
use async_trait::async_trait;
use fetch::Artifact;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[cfg(windows)]
const EXTRACTOR_FILE_NAME: &str = "yt-dlp.exe";
#[cfg(not(windows))]
const EXTRACTOR_FILE_NAME: &str = "yt-dlp";

const ARCHIVE_FILE_NAME: &str = "ffmpeg.zip";
const UNPACK_DIR_NAME: &str = "ffmpeg";

/// Resolves the external tools a download needs
///
/// [`ToolProvisioner`] is the real implementation; tests substitute fixed tool sets.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Make sure the tools exist under `root` and return their locations
    async fn ensure(&self, root: &Path) -> Result<ToolSet>;
}

/// Downloads, verifies and unpacks the extraction tool and transcoder
pub struct ToolProvisioner {
    config: ToolsConfig,
    retry: RetryConfig,
    client: reqwest::Client,
    guard: Mutex<()>,
}

impl ToolProvisioner {
    /// Create a provisioner with the given sources and retry policy
    pub fn new(config: ToolsConfig, retry: RetryConfig) -> Self {
        Self {
            config,
            retry,
            client: reqwest::Client::new(),
            guard: Mutex::new(()),
        }
    }

    /// Make sure both tools are present and valid under `root/bin`
    ///
    /// Only missing or invalid pieces are fetched. Concurrent callers are
    /// serialized, so the archive is never unpacked twice.
    pub async fn ensure(&self, root: &Path) -> Result<ToolSet> {
        let _guard = self.guard.lock().await;

        if self.config.search_path {
            if let Some(tools) = Self::from_search_path() {
                info!(
                    extractor = %tools.extractor_path.display(),
                    transcoder = %tools.transcoder_bin_dir.display(),
                    "using tools found on PATH"
                );
                return Ok(tools);
            }
            debug!("tools not found on PATH, provisioning locally");
        }

        let bin = root.join("bin");
        let extractor_path = bin.join(EXTRACTOR_FILE_NAME);
        let archive_path = bin.join(ARCHIVE_FILE_NAME);
        let unpack_dir = bin.join(UNPACK_DIR_NAME);

        let extractor = Artifact {
            url: &self.config.extractor_url,
            dest: &extractor_path,
            min_bytes: self.config.min_extractor_bytes,
            sha256: self.config.extractor_sha256.as_deref(),
        };
        let archive = Artifact {
            url: &self.config.transcoder_archive_url,
            dest: &archive_path,
            min_bytes: self.config.min_archive_bytes,
            sha256: self.config.transcoder_archive_sha256.as_deref(),
        };

        let need_extractor = !extractor.is_present().await;
        let unpacked = tokio::fs::metadata(&unpack_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        let need_archive = !unpacked && !archive.is_present().await;

        if need_extractor || need_archive {
            tokio::fs::create_dir_all(&bin)
                .await
                .map_err(|e| ProvisioningError::io(&bin, e))?;
            self.check_space(&bin)?;
        }

        if need_extractor {
            info!(url = extractor.url, "downloading extraction tool");
            self.fetch(extractor).await?;
        }
        make_executable(&extractor_path)
            .await
            .map_err(|e| ProvisioningError::io(&extractor_path, e))?;

        if !unpacked {
            if need_archive {
                info!(url = archive.url, "downloading transcoder archive");
                self.fetch(archive).await?;
            }
            unpack::unpack_once(&archive_path, &unpack_dir).await?;
        }

        let transcoder_bin_dir = unpack::locate_bin_dir(&unpack_dir).await?;
        debug!(
            extractor = %extractor_path.display(),
            transcoder = %transcoder_bin_dir.display(),
            "tools ready"
        );

        Ok(ToolSet {
            extractor_path,
            transcoder_bin_dir,
        })
    }

    async fn fetch(&self, artifact: Artifact<'_>) -> Result<u64> {
        let timeout = self.config.download_timeout;
        download_with_retry(&self.retry, || {
            fetch::download(&self.client, artifact, timeout)
        })
        .await
    }

    fn check_space(&self, dir: &Path) -> Result<()> {
        let required = self.config.min_free_space;
        match get_available_space(dir) {
            Ok(available) if available < required => {
                Err(ProvisioningError::InsufficientSpace {
                    required,
                    available,
                }
                .into())
            }
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "could not check free space, continuing");
                Ok(())
            }
        }
    }

    fn from_search_path() -> Option<ToolSet> {
        let extractor_path = which::which("yt-dlp").ok()?;
        let transcoder = which::which("ffmpeg").ok()?;
        let transcoder_bin_dir = transcoder.parent().map(PathBuf::from)?;
        Some(ToolSet {
            extractor_path,
            transcoder_bin_dir,
        })
    }
}

#[async_trait]
impl ToolProvider for ToolProvisioner {
    async fn ensure(&self, root: &Path) -> Result<ToolSet> {
        ToolProvisioner::ensure(self, root).await
    }
}
