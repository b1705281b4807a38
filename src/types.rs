//! Core types for playlist-dl

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Output format chosen for a playlist download
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatProfile {
    /// Best video and audio merged into an MP4 container
    Video,
    /// Audio only, converted to MP3
    Audio,
}

impl FormatProfile {
    /// Name recorded in the history file ("Video" or "Audio")
    pub fn as_str(&self) -> &'static str {
        match self {
            FormatProfile::Video => "Video",
            FormatProfile::Audio => "Audio",
        }
    }

    /// Label shown to users ("MP4 (Video)" or "MP3 (Audio)")
    pub fn label(&self) -> &'static str {
        match self {
            FormatProfile::Video => "MP4 (Video)",
            FormatProfile::Audio => "MP3 (Audio)",
        }
    }

    /// All profiles in display order
    pub fn all() -> [FormatProfile; 2] {
        [FormatProfile::Video, FormatProfile::Audio]
    }
}

impl std::fmt::Display for FormatProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FormatProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FormatProfile::all()
            .into_iter()
            .find(|p| s.eq_ignore_ascii_case(p.as_str()) || s == p.label())
            .ok_or_else(|| format!("unknown format profile: {s}"))
    }
}

/// A request to download one playlist
///
/// The orchestrator takes ownership on submission and never mutates it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Playlist URL passed to the extraction tool
    pub url: String,
    /// Output format
    pub format_profile: FormatProfile,
    /// Existing folder the playlist is written into
    pub destination_folder: PathBuf,
    /// Let the extraction tool overwrite files that already exist
    pub overwrite_existing: bool,
}

impl DownloadRequest {
    /// Create a request that never overwrites existing files
    pub fn new(
        url: impl Into<String>,
        format_profile: FormatProfile,
        destination_folder: impl Into<PathBuf>,
    ) -> Self {
        Self {
            url: url.into(),
            format_profile,
            destination_folder: destination_folder.into(),
            overwrite_existing: false,
        }
    }

    /// Set whether existing files may be overwritten
    pub fn overwrite_existing(mut self, overwrite: bool) -> Self {
        self.overwrite_existing = overwrite;
        self
    }
}

/// Locations of the provisioned external tools
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSet {
    /// Extraction tool executable
    pub extractor_path: PathBuf,
    /// Directory containing the transcoder binaries
    pub transcoder_bin_dir: PathBuf,
}

/// One event from a running extraction process
///
/// `Started` is always first and exactly one of `Exited`/`Aborted` is last.
/// Output lines from the two pipes are interleaved in arrival order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessEvent {
    /// Process spawned
    Started {
        /// OS process id (0 if the platform did not report one)
        pid: u32,
    },
    /// A line written to standard output
    StdOut {
        /// Line without its trailing newline
        line: String,
    },
    /// A line written to standard error
    StdErr {
        /// Line without its trailing newline
        line: String,
    },
    /// Process exited on its own
    Exited {
        /// Exit code, `None` when killed by a signal
        code: Option<i32>,
    },
    /// Process was terminated after a cancellation request
    Aborted {
        /// Exit code observed after termination, if any
        code: Option<i32>,
    },
}

impl ProcessEvent {
    /// Whether this event ends the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessEvent::Exited { .. } | ProcessEvent::Aborted { .. })
    }
}

/// Current completion of a run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    /// Completion in `[0, 1]`
    pub fraction: f64,
    /// Human-readable form, e.g. "42.5%"
    pub label: String,
}

impl ProgressState {
    /// Build a state from a percentage, clamping into `[0, 100]`
    pub fn from_percent(percent: f64) -> Self {
        let percent = if percent.is_nan() {
            0.0
        } else {
            percent.clamp(0.0, 100.0)
        };
        Self {
            fraction: percent / 100.0,
            label: format!("{percent:.1}%"),
        }
    }

    /// Nothing downloaded yet
    pub fn zero() -> Self {
        Self::from_percent(0.0)
    }

    /// Everything downloaded
    pub fn complete() -> Self {
        Self::from_percent(100.0)
    }
}

impl Default for ProgressState {
    fn default() -> Self {
        Self::zero()
    }
}

/// One recorded download attempt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Playlist URL
    pub url: String,
    /// Format name ("Video" or "Audio")
    pub format: String,
    /// When the attempt was recorded
    pub timestamp_utc: DateTime<Utc>,
}

impl HistoryEntry {
    /// Record an attempt for `request` at the current time
    pub fn for_request(request: &DownloadRequest) -> Self {
        Self {
            url: request.url.clone(),
            format: request.format_profile.as_str().to_string(),
            timestamp_utc: Utc::now(),
        }
    }
}

/// Lifecycle state of the orchestrator
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// No run active
    #[default]
    Idle,
    /// Checking the request
    Validating,
    /// Ensuring the external tools are present
    Provisioning,
    /// Extraction tool running
    Running,
    /// Run finished successfully
    Completed,
    /// Run finished with an error
    Failed,
}

impl RunState {
    /// Whether this state ends a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }
}

/// Timestamped line in the run log
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    /// Local time the line was recorded
    pub timestamp: DateTime<Local>,
    /// Message text
    pub message: String,
}

impl LogLine {
    /// Stamp `message` with the current local time
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for LogLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S"), self.message)
    }
}

/// Snapshot of the orchestrator for observers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    /// Current lifecycle state
    pub state: RunState,
    /// Progress of the current (or last) run
    pub progress: ProgressState,
    /// User-facing status text
    pub message: String,
    /// Message of the error that ended the last run, if it failed
    pub last_error: Option<String>,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self {
            state: RunState::Idle,
            progress: ProgressState::zero(),
            message: "Ready".to_string(),
            last_error: None,
        }
    }
}

/// What a successful run resolves to
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Playlist URL
    pub url: String,
    /// Format profile used
    pub format: FormatProfile,
    /// Exit code reported by the extraction tool (always 0 for a summary)
    pub exit_code: i32,
    /// Final progress (always complete)
    pub progress: ProgressState,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
}

/// Event emitted by the orchestrator during a run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The run moved to a new lifecycle state
    StateChanged {
        /// New state
        state: RunState,
    },
    /// A line was appended to the run log
    Log {
        /// The appended line
        line: LogLine,
    },
    /// Progress changed
    Progress {
        /// New progress
        progress: ProgressState,
    },
    /// An attempt was written to the destination's history file
    HistoryRecorded {
        /// The written entry
        entry: HistoryEntry,
    },
    /// The run reached a terminal state
    Finished {
        /// `Completed` or `Failed`
        state: RunState,
        /// Error message when the run failed
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}
