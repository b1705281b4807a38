//! Transcoder archive unpacking
//!
//! The archive is unpacked into a staging directory next to the target and renamed
//! into place once every entry is written. The target directory therefore exists
//! only when it is complete, and its presence is what marks the unpack as done.

use crate::error::{Error, ProvisioningError, Result};
use crate::utils::sibling_with_suffix;
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use tracing::{debug, info, warn};

#[cfg(windows)]
const TRANSCODER_BINARY: &str = "ffmpeg.exe";
#[cfg(not(windows))]
const TRANSCODER_BINARY: &str = "ffmpeg";

/// Unpack `archive` into `target` unless `target` already exists
pub(crate) async fn unpack_once(archive: &Path, target: &Path) -> Result<()> {
    if is_dir(target).await {
        debug!(target = %target.display(), "transcoder already unpacked");
        return Ok(());
    }

    let staging = sibling_with_suffix(target, ".partial");
    if is_dir(&staging).await {
        warn!(staging = %staging.display(), "removing leftover staging directory");
        tokio::fs::remove_dir_all(&staging)
            .await
            .map_err(|e| ProvisioningError::io(&staging, e))?;
    }

    let archive_owned = archive.to_path_buf();
    let staging_owned = staging.clone();
    let count = spawn_blocking(move || unpack_zip(&archive_owned, &staging_owned))
        .await
        .map_err(|e| ProvisioningError::Unpack {
            archive: archive.to_path_buf(),
            reason: format!("unpack task panicked: {e}"),
        })?;

    let count = match count {
        Ok(count) => count,
        Err(e) => {
            // a leftover is removed on the next attempt anyway
            let _ = tokio::fs::remove_dir_all(&staging).await;
            if matches!(e, ProvisioningError::Unpack { .. }) {
                discard_archive(archive, &e).await;
            }
            return Err(e.into());
        }
    };

    tokio::fs::rename(&staging, target)
        .await
        .map_err(|e| ProvisioningError::io(target, e))?;

    info!(
        archive = %archive.display(),
        target = %target.display(),
        files = count,
        "transcoder unpacked"
    );
    Ok(())
}

/// Delete an archive that could not be read so the next provisioning fetches it again
async fn discard_archive(archive: &Path, cause: &ProvisioningError) {
    warn!(archive = %archive.display(), error = %cause, "removing unreadable transcoder archive");
    if let Err(e) = tokio::fs::remove_file(archive).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(archive = %archive.display(), error = %e, "failed to remove transcoder archive");
        }
    }
}

/// Extract every entry of a zip archive below `dest`, returning the file count
///
/// Entries whose names would escape `dest` are skipped.
pub(crate) fn unpack_zip(archive_path: &Path, dest: &Path) -> std::result::Result<usize, ProvisioningError> {
    let unpack_err = |reason: String| ProvisioningError::Unpack {
        archive: archive_path.to_path_buf(),
        reason,
    };

    std::fs::create_dir_all(dest).map_err(|e| ProvisioningError::io(dest, e))?;
    let file = std::fs::File::open(archive_path).map_err(|e| ProvisioningError::io(archive_path, e))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| unpack_err(format!("failed to read zip archive: {e}")))?;

    let mut files = 0;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| unpack_err(format!("failed to read zip entry {index}: {e}")))?;

        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            warn!(entry = entry.name(), "skipping entry with unsafe path");
            continue;
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| ProvisioningError::io(&out_path, e))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ProvisioningError::io(parent, e))?;
        }
        let mut out = std::fs::File::create(&out_path).map_err(|e| ProvisioningError::io(&out_path, e))?;
        std::io::copy(&mut entry, &mut out)
            .map_err(|e| unpack_err(format!("failed to extract {}: {e}", out_path.display())))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode & 0o777))
                .map_err(|e| ProvisioningError::io(&out_path, e))?;
        }

        files += 1;
    }

    Ok(files)
}

/// Directory holding the transcoder binary inside an unpacked distribution
///
/// Checks `<dir>`, then `<dir>/bin`, then `<dir>/*/bin` (sorted), so both flat
/// archives and `ffmpeg-x.y-full_build/bin` layouts resolve.
pub(crate) async fn locate_bin_dir(dir: &Path) -> Result<PathBuf> {
    let mut candidates = vec![dir.to_path_buf(), dir.join("bin")];

    let mut nested = Vec::new();
    if let Ok(mut entries) = tokio::fs::read_dir(dir).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if is_dir(&path).await {
                nested.push(path.join("bin"));
            }
        }
    }
    nested.sort();
    candidates.extend(nested);

    for candidate in candidates {
        if tokio::fs::metadata(candidate.join(TRANSCODER_BINARY))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            return Ok(candidate);
        }
    }

    Err(Error::Provisioning(ProvisioningError::TranscoderNotFound {
        dir: dir.to_path_buf(),
    }))
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}
