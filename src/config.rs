//! Configuration types for playlist-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// External tool sources and integrity settings
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Root under which the `bin` tool directory is created (default: ".")
    #[serde(default = "default_install_root")]
    pub install_root: PathBuf,

    /// Direct download URL of the extraction tool executable
    #[serde(default = "default_extractor_url")]
    pub extractor_url: String,

    /// Download URL of the transcoder distribution (zip archive)
    #[serde(default = "default_transcoder_archive_url")]
    pub transcoder_archive_url: String,

    /// Expected SHA-256 of the extractor executable (lowercase hex, unchecked if None)
    #[serde(default)]
    pub extractor_sha256: Option<String>,

    /// Expected SHA-256 of the transcoder archive (lowercase hex, unchecked if None)
    #[serde(default)]
    pub transcoder_archive_sha256: Option<String>,

    /// Smallest extractor file accepted as a complete download (default: 1 MiB)
    #[serde(default = "default_min_tool_bytes")]
    pub min_extractor_bytes: u64,

    /// Smallest transcoder archive accepted as a complete download (default: 1 MiB)
    #[serde(default = "default_min_tool_bytes")]
    pub min_archive_bytes: u64,

    /// Free space required before downloading anything (default: 512 MiB)
    #[serde(default = "default_min_free_space")]
    pub min_free_space: u64,

    /// Use `yt-dlp`/`ffmpeg` found on PATH instead of downloading (default: false)
    #[serde(default)]
    pub search_path: bool,

    /// Timeout for a single tool download (default: 10 minutes)
    #[serde(default = "default_download_timeout", with = "duration_serde")]
    pub download_timeout: Duration,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            install_root: default_install_root(),
            extractor_url: default_extractor_url(),
            transcoder_archive_url: default_transcoder_archive_url(),
            extractor_sha256: None,
            transcoder_archive_sha256: None,
            min_extractor_bytes: default_min_tool_bytes(),
            min_archive_bytes: default_min_tool_bytes(),
            min_free_space: default_min_free_space(),
            search_path: false,
            download_timeout: default_download_timeout(),
        }
    }
}

/// Subprocess and run-log settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Time between the graceful terminate signal and a forced kill (default: 5 seconds)
    #[serde(default = "default_kill_grace_period", with = "duration_serde")]
    pub kill_grace_period: Duration,

    /// Capacity of the process event channel (default: 256)
    ///
    /// When the consumer falls behind, the output readers block instead of
    /// buffering without limit.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Maximum number of lines kept in the run log (default: 5000)
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,

    /// Number of trailing stderr lines attached to a runtime failure (default: 20)
    #[serde(default = "default_stderr_tail_lines")]
    pub stderr_tail_lines: usize,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            kill_grace_period: default_kill_grace_period(),
            event_buffer: default_event_buffer(),
            log_capacity: default_log_capacity(),
            stderr_tail_lines: default_stderr_tail_lines(),
        }
    }
}

/// Per-destination-folder file names
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    /// History file written into every destination folder
    #[serde(default = "default_history_file_name")]
    pub history_file_name: String,

    /// Download archive (ledger) passed to the extractor for resume support
    #[serde(default = "default_ledger_file_name")]
    pub ledger_file_name: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            history_file_name: default_history_file_name(),
            ledger_file_name: default_ledger_file_name(),
        }
    }
}

/// Retry configuration for transient provisioning failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration for [`DownloadOrchestrator`](crate::DownloadOrchestrator)
///
/// Every field has a default, so `{}` deserializes to a working configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Tool provisioning
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Subprocess handling and run log
    #[serde(default)]
    pub process: ProcessConfig,

    /// File names used inside destination folders
    #[serde(default)]
    pub output: OutputConfig,

    /// Retry policy for tool downloads
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Load a configuration from a JSON file and validate it
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make a run impossible
    pub fn validate(&self) -> Result<()> {
        if self.process.event_buffer == 0 {
            return Err(config_error("event_buffer must be at least 1", "process.event_buffer"));
        }
        if self.process.log_capacity == 0 {
            return Err(config_error("log_capacity must be at least 1", "process.log_capacity"));
        }
        if self.output.history_file_name.trim().is_empty() {
            return Err(config_error(
                "history_file_name must not be empty",
                "output.history_file_name",
            ));
        }
        if self.output.ledger_file_name.trim().is_empty() {
            return Err(config_error(
                "ledger_file_name must not be empty",
                "output.ledger_file_name",
            ));
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(config_error(
                "backoff_multiplier must be a finite number of at least 1",
                "retry.backoff_multiplier",
            ));
        }
        for (key, value) in [
            ("tools.extractor_url", &self.tools.extractor_url),
            ("tools.transcoder_archive_url", &self.tools.transcoder_archive_url),
        ] {
            match url::Url::parse(value) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                Ok(parsed) => {
                    return Err(config_error(
                        &format!("unsupported scheme '{}'", parsed.scheme()),
                        key,
                    ));
                }
                Err(e) => return Err(config_error(&format!("invalid URL: {e}"), key)),
            }
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

fn default_install_root() -> PathBuf {
    PathBuf::from(".")
}

#[cfg(windows)]
fn default_extractor_url() -> String {
    "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp.exe".to_string()
}

#[cfg(target_os = "macos")]
fn default_extractor_url() -> String {
    "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp_macos".to_string()
}

#[cfg(not(any(windows, target_os = "macos")))]
fn default_extractor_url() -> String {
    "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp_linux".to_string()
}

#[cfg(windows)]
fn default_transcoder_archive_url() -> String {
    "https://github.com/GyanD/codexffmpeg/releases/download/6.0/ffmpeg-6.0-full_build.zip"
        .to_string()
}

#[cfg(target_os = "macos")]
fn default_transcoder_archive_url() -> String {
    "https://github.com/ffbinaries/ffbinaries-prebuilt/releases/download/v6.1/ffmpeg-6.1-macos-64.zip"
        .to_string()
}

#[cfg(not(any(windows, target_os = "macos")))]
fn default_transcoder_archive_url() -> String {
    "https://github.com/ffbinaries/ffbinaries-prebuilt/releases/download/v6.1/ffmpeg-6.1-linux-64.zip"
        .to_string()
}

fn default_min_tool_bytes() -> u64 {
    1024 * 1024
}

fn default_min_free_space() -> u64 {
    512 * 1024 * 1024
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_kill_grace_period() -> Duration {
    Duration::from_secs(5)
}

fn default_event_buffer() -> usize {
    256
}

fn default_log_capacity() -> usize {
    5000
}

fn default_stderr_tail_lines() -> usize {
    20
}

fn default_history_file_name() -> String {
    "playlist_history.json".to_string()
}

fn default_ledger_file_name() -> String {
    "download_archive.txt".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
