//! Error types for playlist-dl
//!
//! The taxonomy mirrors the lifecycle of a run:
//! - [`ValidationError`] - bad input, rejected before any side effect
//! - [`ProvisioningError`] - fetching or unpacking the external tools failed
//! - process launch and runtime failures of the extraction tool
//! - cancellation requested by the caller
//! - history persistence failures, which are recovered locally and never fatal

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for playlist-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for playlist-dl
#[derive(Debug, Error)]
pub enum Error {
    /// The download request was rejected during validation
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The external tools could not be provisioned
    #[error("provisioning error: {0}")]
    Provisioning(#[from] ProvisioningError),

    /// The extraction tool could not be started
    #[error("failed to launch {executable}: {reason}")]
    ProcessLaunch {
        /// Executable that failed to start
        executable: PathBuf,
        /// Underlying OS error message
        reason: String,
    },

    /// The extraction tool ran but did not exit successfully
    #[error("extraction tool failed ({})", describe_exit(.code, .stderr_tail))]
    ProcessRuntime {
        /// Exit code, `None` when the process was terminated by a signal
        code: Option<i32>,
        /// Last lines the tool wrote to standard error
        stderr_tail: Vec<String>,
    },

    /// The run was aborted by the caller
    #[error("download cancelled")]
    Cancelled,

    /// The history file could not be read or written
    #[error("history persistence failed for {path}: {reason}")]
    HistoryPersistence {
        /// History file involved
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Another download is already active on this orchestrator
    #[error("a download is already in progress")]
    Busy,

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "process.event_buffer")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

fn describe_exit(code: &Option<i32>, stderr_tail: &[String]) -> String {
    let code = match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated without exit code".to_string(),
    };
    match stderr_tail.last() {
        Some(last) => format!("{code}: {last}"),
        None => code,
    }
}

/// Reasons a [`DownloadRequest`](crate::types::DownloadRequest) is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The URL was empty or whitespace only
    #[error("please enter a playlist URL")]
    EmptyUrl,

    /// The URL could not be parsed
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The rejected URL
        url: String,
        /// Parser error message
        reason: String,
    },

    /// The URL uses a scheme other than http or https
    #[error("unsupported URL scheme '{scheme}' (expected http or https)")]
    UnsupportedScheme {
        /// The rejected scheme
        scheme: String,
    },

    /// The destination folder does not exist
    #[error("destination folder {path} does not exist")]
    DestinationMissing {
        /// The missing folder
        path: PathBuf,
    },

    /// The destination exists but is not a directory
    #[error("destination {path} is not a directory")]
    DestinationNotDirectory {
        /// The offending path
        path: PathBuf,
    },
}

/// Tool provisioning errors (download, integrity, unpack)
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// The request to a tool source failed before a response arrived
    #[error("failed to fetch {url}: {reason}")]
    Fetch {
        /// Source URL
        url: String,
        /// Underlying error message
        reason: String,
    },

    /// A tool source answered with a non-success status
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// Source URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// A downloaded file is smaller than the configured minimum
    #[error("{path} is too small: expected at least {expected_min} bytes, got {actual}")]
    TooSmall {
        /// File that failed the size check
        path: PathBuf,
        /// Minimum accepted size
        expected_min: u64,
        /// Actual size on disk
        actual: u64,
    },

    /// A downloaded file does not match its configured SHA-256 digest
    #[error("hash mismatch for {path}: expected {expected}, got {actual}")]
    HashMismatch {
        /// File that failed the digest check
        path: PathBuf,
        /// Configured digest (lowercase hex)
        expected: String,
        /// Computed digest (lowercase hex)
        actual: String,
    },

    /// Not enough free space to provision the tools
    #[error("insufficient disk space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Number of bytes required
        required: u64,
        /// Number of bytes currently available
        available: u64,
    },

    /// The transcoder archive could not be unpacked
    #[error("failed to unpack {archive}: {reason}")]
    Unpack {
        /// Archive being unpacked
        archive: PathBuf,
        /// Underlying error message
        reason: String,
    },

    /// The unpacked archive does not contain the transcoder binary
    #[error("no transcoder binary found under {dir}")]
    TranscoderNotFound {
        /// Directory that was searched
        dir: PathBuf,
    },

    /// Filesystem failure while writing tools
    #[error("I/O error at {path}: {reason}")]
    Io {
        /// Path being written or read
        path: PathBuf,
        /// Underlying error message
        reason: String,
    },
}

impl ProvisioningError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        ProvisioningError::Io {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

impl Error {
    /// Machine-readable error code, stable across releases
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Validation(e) => match e {
                ValidationError::EmptyUrl => "empty_url",
                ValidationError::InvalidUrl { .. } => "invalid_url",
                ValidationError::UnsupportedScheme { .. } => "unsupported_scheme",
                ValidationError::DestinationMissing { .. } => "destination_missing",
                ValidationError::DestinationNotDirectory { .. } => "destination_not_directory",
            },
            Error::Provisioning(e) => match e {
                ProvisioningError::Fetch { .. } => "fetch_failed",
                ProvisioningError::HttpStatus { .. } => "http_status",
                ProvisioningError::TooSmall { .. } => "file_too_small",
                ProvisioningError::HashMismatch { .. } => "hash_mismatch",
                ProvisioningError::InsufficientSpace { .. } => "insufficient_space",
                ProvisioningError::Unpack { .. } => "unpack_failed",
                ProvisioningError::TranscoderNotFound { .. } => "transcoder_not_found",
                ProvisioningError::Io { .. } => "provisioning_io",
            },
            Error::ProcessLaunch { .. } => "process_launch",
            Error::ProcessRuntime { .. } => "process_runtime",
            Error::Cancelled => "cancelled",
            Error::HistoryPersistence { .. } => "history_persistence",
            Error::Busy => "busy",
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Other(_) => "internal_error",
        }
    }

    /// Whether this error aborts a run
    ///
    /// History persistence failures are recovered locally and never change the
    /// outcome of a download.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::HistoryPersistence { .. })
    }
}
