//! Streaming downloads with integrity checks
//!
//! A file is streamed into `<dest>.part`, checked against its minimum size and
//! optional SHA-256, and only then renamed to `<dest>`. An interrupted or corrupt
//! download never occupies the final path.

use crate::error::{Error, ProvisioningError, Result};
use crate::utils::{file_len, sha256_file, sibling_with_suffix};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Where a tool comes from and how to recognise a complete copy of it
#[derive(Clone, Copy, Debug)]
pub(crate) struct Artifact<'a> {
    pub url: &'a str,
    pub dest: &'a Path,
    pub min_bytes: u64,
    pub sha256: Option<&'a str>,
}

impl Artifact<'_> {
    /// Whether `dest` already holds a valid copy
    pub async fn is_present(&self) -> bool {
        verify(self.dest, self.min_bytes, self.sha256).await.is_ok()
    }
}

/// Check size (never zero) and, when given, the SHA-256 of `path`
pub(crate) async fn verify(
    path: &Path,
    min_bytes: u64,
    sha256: Option<&str>,
) -> std::result::Result<(), ProvisioningError> {
    let expected_min = min_bytes.max(1);
    let actual = file_len(path).await.unwrap_or(0);
    if actual < expected_min {
        return Err(ProvisioningError::TooSmall {
            path: path.to_path_buf(),
            expected_min,
            actual,
        });
    }

    if let Some(expected) = sha256 {
        let actual = sha256_file(path)
            .await
            .map_err(|e| ProvisioningError::io(path, e))?;
        if !actual.eq_ignore_ascii_case(expected.trim()) {
            return Err(ProvisioningError::HashMismatch {
                path: path.to_path_buf(),
                expected: expected.trim().to_ascii_lowercase(),
                actual,
            });
        }
    }

    Ok(())
}

/// Download `artifact` once, replacing its destination only on success
pub(crate) async fn download(
    client: &reqwest::Client,
    artifact: Artifact<'_>,
    timeout: Duration,
) -> Result<u64> {
    let part = sibling_with_suffix(artifact.dest, ".part");

    let result = stream_to(client, artifact.url, &part, timeout).await;
    let written = match result {
        Ok(written) => written,
        Err(e) => {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e);
        }
    };

    if let Err(e) = verify(&part, artifact.min_bytes, artifact.sha256).await {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(e.into());
    }

    tokio::fs::rename(&part, artifact.dest)
        .await
        .map_err(|e| ProvisioningError::io(artifact.dest, e))?;

    tracing::info!(
        url = artifact.url,
        path = %artifact.dest.display(),
        bytes = written,
        "tool downloaded"
    );
    Ok(written)
}

async fn stream_to(
    client: &reqwest::Client,
    url: &str,
    part: &Path,
    timeout: Duration,
) -> Result<u64> {
    let fetch_err = |e: reqwest::Error| {
        Error::Provisioning(ProvisioningError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })
    };

    let mut response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(fetch_err)?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProvisioningError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        }
        .into());
    }

    let mut file = tokio::fs::File::create(part)
        .await
        .map_err(|e| ProvisioningError::io(part, e))?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await.map_err(fetch_err)? {
        file.write_all(&chunk)
            .await
            .map_err(|e| ProvisioningError::io(part, e))?;
        written += chunk.len() as u64;
    }
    file.sync_all()
        .await
        .map_err(|e| ProvisioningError::io(part, e))?;

    Ok(written)
}
