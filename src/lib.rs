//! # playlist-dl
//!
//! Backend library that downloads whole playlists with yt-dlp.
//!
//! ## Design Philosophy
//!
//! playlist-dl is designed to be:
//! - **Self-provisioning** - fetches and verifies yt-dlp and ffmpeg on first use
//! - **Sensible defaults** - `Config::default()` works out of the box
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use playlist_dl::{Config, DownloadOrchestrator, DownloadRequest, FormatProfile};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = DownloadOrchestrator::new(Config::default())?;
//!
//!     // Subscribe to events
//!     let mut events = orchestrator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let request = DownloadRequest::new(
//!         "https://www.youtube.com/playlist?list=PL1234",
//!         FormatProfile::Audio,
//!         "/srv/music",
//!     );
//!     let summary = orchestrator.download(request).await?;
//!     println!("finished with exit code {}", summary.exit_code);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Extraction tool command lines
pub mod command;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Per-folder download history
pub mod history;
/// Run orchestration (decomposed into focused submodules)
pub mod orchestrator;
/// Progress parsing
pub mod progress;
/// Tool provisioning
pub mod provision;
/// Retry logic with exponential backoff
pub mod retry;
/// Child process supervision
pub mod runner;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use command::{CommandBuilder, CommandSpec};
pub use config::{Config, OutputConfig, ProcessConfig, RetryConfig, ToolsConfig};
pub use error::{Error, ProvisioningError, Result, ValidationError};
pub use history::HistoryStore;
pub use orchestrator::{DownloadOrchestrator, RunHandle};
pub use progress::ProgressExtractor;
pub use provision::{ToolProvider, ToolProvisioner};
pub use runner::{ProcessLauncher, ProcessRun, ProcessRunner};
pub use types::{
    DownloadRequest, Event, FormatProfile, HistoryEntry, LogLine, ProcessEvent, ProgressState,
    RunState, RunStatus, RunSummary, ToolSet,
};

/// Abort the active download when the process is asked to stop.
///
/// Waits for a termination signal and then calls the orchestrator's `abort()` method,
/// so the extraction tool is stopped instead of being orphaned.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Returns whether a run was active when the signal arrived.
///
/// # Example
///
/// ```no_run
/// use playlist_dl::{Config, DownloadOrchestrator, abort_on_signal};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let orchestrator = DownloadOrchestrator::new(Config::default())?;
///
///     let watcher = orchestrator.clone();
///     tokio::spawn(async move { abort_on_signal(&watcher).await });
///
///     Ok(())
/// }
/// ```
pub async fn abort_on_signal(orchestrator: &DownloadOrchestrator) -> bool {
    wait_for_signal().await;
    orchestrator.abort().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // registration can fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM, aborting download"),
                _ = sigint.recv() => tracing::info!("received SIGINT, aborting download"),
            }
        }
        (Ok(mut only), Err(e)) | (Err(e), Ok(mut only)) => {
            tracing::warn!(error = %e, "could not register every signal handler");
            only.recv().await;
            tracing::info!("received termination signal, aborting download");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received Ctrl+C, aborting download"),
        Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl+C"),
    }
}
