//! Per-folder download history
//!
//! Every destination folder carries a JSON file listing the downloads that were
//! attempted there, oldest first:
//!
//! ```json
//! [
//!   { "url": "https://www.youtube.com/playlist?list=PL123", "format": "Video", "timestampUtc": "2024-05-01T10:00:00Z" }
//! ]
//! ```
//!
//! An entry is written when the extraction tool is about to be launched, so the
//! history records attempts, not successes.

use crate::config::OutputConfig;
use crate::error::{Error, Result};
use crate::types::HistoryEntry;
use crate::utils::atomic_write;
use std::path::{Path, PathBuf};

/// Append-only history of download attempts, one JSON file per destination folder
///
/// `append` is a read-modify-write of the whole file and is not safe under
/// concurrent writers to the same folder. The orchestrator's single-run guard keeps
/// writes from one instance serialized.
#[derive(Clone, Debug)]
pub struct HistoryStore {
    file_name: String,
}

impl HistoryStore {
    /// Store writing `file_name` into each destination folder
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }

    /// Store using the configured history file name
    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(config.history_file_name.clone())
    }

    /// Location of the history file for `folder`
    pub fn history_path(&self, folder: &Path) -> PathBuf {
        folder.join(&self.file_name)
    }

    /// All entries recorded in `folder`, oldest first
    ///
    /// A folder without a history file has an empty history. A file that exists
    /// but cannot be parsed is an error, never treated as empty.
    pub async fn load(&self, folder: &Path) -> Result<Vec<HistoryEntry>> {
        let path = self.history_path(folder);
        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(persistence(&path, e)),
        };

        if contents.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&contents).map_err(|e| persistence(&path, e))
    }

    /// Append `entry` to the history of `folder`
    ///
    /// The file is rewritten in full through a temp file and rename, so readers see
    /// either the old list or the new one.
    pub async fn append(&self, folder: &Path, entry: HistoryEntry) -> Result<()> {
        let path = self.history_path(folder);
        let mut entries = self.load(folder).await?;
        entries.push(entry);

        let json = serde_json::to_vec_pretty(&entries).map_err(|e| persistence(&path, e))?;
        atomic_write(&path, &json)
            .await
            .map_err(|e| persistence(&path, e))?;

        tracing::debug!(path = %path.display(), entries = entries.len(), "history updated");
        Ok(())
    }
}

fn persistence(path: &Path, err: impl std::fmt::Display) -> Error {
    Error::HistoryPersistence {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn entry(url: &str, format: &str, secs: i64) -> HistoryEntry {
        HistoryEntry {
            url: url.to_string(),
            format: format.to_string(),
            timestamp_utc: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn missing_file_is_empty_history() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new("playlist_history.json");

        assert!(store.load(dir.path()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn appends_keep_order_and_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new("playlist_history.json");
        let first = entry("https://example.com/list?a", "Video", 0);
        let second = entry("https://example.com/list?b", "Audio", 60);

        store.append(dir.path(), first.clone()).await.unwrap();
        store.append(dir.path(), second.clone()).await.unwrap();

        let loaded = store.load(dir.path()).await.unwrap();
        assert_eq!(loaded, vec![first, second]);
    }

    #[tokio::test]
    async fn file_uses_camel_case_keys() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new("playlist_history.json");
        store
            .append(dir.path(), entry("https://example.com/p", "Audio", 0))
            .await
            .unwrap();

        let raw = std::fs::read_to_string(store.history_path(dir.path())).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let first = &value.as_array().unwrap()[0];
        assert_eq!(first["url"], "https://example.com/p");
        assert_eq!(first["format"], "Audio");
        assert!(first.get("timestampUtc").is_some(), "raw file: {raw}");
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error_and_left_untouched() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new("playlist_history.json");
        let path = store.history_path(dir.path());
        std::fs::write(&path, "{ not json").unwrap();

        let err = store
            .append(dir.path(), entry("https://example.com/p", "Video", 0))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::HistoryPersistence { .. }), "got {err:?}");
        assert!(!err.is_fatal());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[tokio::test]
    async fn whitespace_only_file_is_empty_history() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new("h.json");
        std::fs::write(store.history_path(dir.path()), "\n  \n").unwrap();

        assert!(store.load(dir.path()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_folder_fails_to_append() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new("h.json");

        let result = store
            .append(&dir.path().join("gone"), entry("https://example.com/p", "Video", 0))
            .await;

        assert!(matches!(result, Err(Error::HistoryPersistence { .. })));
    }

    #[test]
    fn path_comes_from_config() {
        let store = HistoryStore::from_config(&OutputConfig::default());
        assert_eq!(
            store.history_path(Path::new("/music")),
            PathBuf::from("/music/playlist_history.json")
        );
    }
}
