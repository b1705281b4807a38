//! Download orchestration
//!
//! [`DownloadOrchestrator`] drives one playlist download at a time through
//! validation, tool provisioning, command construction, history recording and the
//! extraction tool run. Observers follow along through [`DownloadOrchestrator::subscribe`]
//! or poll [`DownloadOrchestrator::status`] and the run log.
//!
//! State machine:
//!
//! ```text
//! Idle -> Validating -> Provisioning -> Running -> Completed | Failed -> Idle
//! ```

mod control;
mod run_log;
mod run;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use control::RunHandle;

use crate::command::CommandBuilder;
use crate::config::Config;
use crate::error::Result;
use crate::history::HistoryStore;
use crate::provision::{ToolProvider, ToolProvisioner};
use crate::runner::{ProcessLauncher, ProcessRunner};
use crate::types::{Event, HistoryEntry, LogLine, ProgressState, RunState, RunStatus, ToolSet};
use run_log::RunLog;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::{Mutex, OnceCell, broadcast};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_util::sync::CancellationToken;

/// Coordinates playlist downloads (cloneable, all state is shared)
#[derive(Clone)]
pub struct DownloadOrchestrator {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Resolves the extraction tool and transcoder
    pub(crate) provider: Arc<dyn ToolProvider>,
    /// Starts the extraction tool
    pub(crate) launcher: Arc<dyn ProcessLauncher>,
    /// Turns requests into command lines
    pub(crate) builder: CommandBuilder,
    /// Per-folder attempt history
    pub(crate) history: HistoryStore,
    /// Tools, resolved once per orchestrator
    pub(crate) tools: Arc<OnceCell<ToolSet>>,
    /// Set while a run is active (single-flight)
    pub(crate) busy: Arc<AtomicBool>,
    /// Observable status snapshot
    pub(crate) status: Arc<Mutex<RunStatus>>,
    /// Bounded run log
    pub(crate) log: Arc<Mutex<RunLog>>,
    /// Cancellation token of the active run
    pub(crate) cancel: Arc<Mutex<Option<CancellationToken>>>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
}

impl DownloadOrchestrator {
    /// Create an orchestrator that downloads its tools and runs the real extractor
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let provider = Arc::new(ToolProvisioner::new(
            config.tools.clone(),
            config.retry.clone(),
        ));
        let launcher = Arc::new(ProcessRunner::new(config.process.clone()));
        Ok(Self::with_components(config, provider, launcher))
    }

    /// Create an orchestrator with custom tool provisioning and process launching
    pub fn with_components(
        config: Config,
        provider: Arc<dyn ToolProvider>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        let (event_tx, _rx) = broadcast::channel(1000);
        Self {
            builder: CommandBuilder::from_env(&config.output),
            history: HistoryStore::from_config(&config.output),
            log: Arc::new(Mutex::new(RunLog::new(config.process.log_capacity))),
            config: Arc::new(config),
            provider,
            launcher,
            tools: Arc::new(OnceCell::new()),
            busy: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(RunStatus::default())),
            cancel: Arc::new(Mutex::new(None)),
            event_tx,
        }
    }

    /// Subscribe to run events
    ///
    /// Each subscriber gets its own copy of every event sent after it subscribed.
    /// A subscriber that falls more than 1000 events behind sees
    /// [`broadcast::error::RecvError::Lagged`] and skips ahead.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Run events as a stream, skipping over gaps left by a slow consumer
    pub fn event_stream(&self) -> impl tokio_stream::Stream<Item = Event> + Send + 'static {
        BroadcastStream::new(self.event_tx.subscribe()).filter_map(|result| match result {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event stream lagged");
                None
            }
        })
    }

    /// Current status snapshot
    pub async fn status(&self) -> RunStatus {
        self.status.lock().await.clone()
    }

    /// Remove and return the buffered run log, oldest line first
    pub async fn drain_log(&self) -> Vec<LogLine> {
        self.log.lock().await.drain()
    }

    /// Copy of the buffered run log without removing it
    pub async fn log_snapshot(&self) -> Vec<LogLine> {
        self.log.lock().await.snapshot()
    }

    /// History recorded in `folder`, oldest first
    pub async fn history(&self, folder: &Path) -> Result<Vec<HistoryEntry>> {
        self.history.load(folder).await
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    pub(crate) fn emit_event(&self, event: Event) {
        // no subscribers is fine, the event is dropped
        self.event_tx.send(event).ok();
    }

    /// Append a timestamped line to the run log and broadcast it
    pub(crate) async fn log_line(&self, message: impl Into<String>) {
        let line = LogLine::now(message);
        self.log.lock().await.push(line.clone());
        self.emit_event(Event::Log { line });
    }

    pub(crate) async fn set_state(&self, state: RunState) {
        self.status.lock().await.state = state;
        self.emit_event(Event::StateChanged { state });
    }

    pub(crate) async fn set_message(&self, message: &str) {
        self.status.lock().await.message = message.to_string();
    }

    pub(crate) async fn set_progress(&self, progress: ProgressState) {
        {
            let mut status = self.status.lock().await;
            if status.progress == progress {
                return;
            }
            status.progress = progress.clone();
        }
        self.emit_event(Event::Progress { progress });
    }
}
