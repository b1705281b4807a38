//! The run sequence of a single download

use super::DownloadOrchestrator;
use crate::error::{Error, Result, ValidationError};
use crate::progress::ProgressExtractor;
use crate::runner::ProcessRun;
use crate::types::{
    DownloadRequest, Event, HistoryEntry, ProcessEvent, ProgressState, RunState, RunSummary,
    ToolSet,
};
use chrono::Utc;
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

impl DownloadOrchestrator {
    /// Drive `request` to a terminal state and back to idle
    pub(crate) async fn run(
        &self,
        request: &DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        // the trimmed URL is the one validated, launched and recorded
        let request = &DownloadRequest {
            url: request.url.trim().to_string(),
            ..request.clone()
        };
        let started_at = Utc::now();
        {
            let mut status = self.status.lock().await;
            status.progress = ProgressState::zero();
            status.last_error = None;
        }
        self.emit_event(Event::Progress {
            progress: ProgressState::zero(),
        });

        let outcome = self.execute(request, cancel).await;

        let result = match outcome {
            Ok(()) => {
                self.set_progress(ProgressState::complete()).await;
                self.log_line("Download completed!").await;
                self.set_message("Completed successfully!").await;
                self.set_state(RunState::Completed).await;
                info!(url = %request.url, "download completed");
                self.emit_event(Event::Finished {
                    state: RunState::Completed,
                    error: None,
                });
                Ok(RunSummary {
                    url: request.url.clone(),
                    format: request.format_profile,
                    exit_code: 0,
                    progress: ProgressState::complete(),
                    started_at,
                    finished_at: Utc::now(),
                })
            }
            Err(e) => {
                let message = e.to_string();
                self.set_progress(ProgressState::zero()).await;
                self.log_line(format!("Error: {message}")).await;
                {
                    let mut status = self.status.lock().await;
                    status.message = "Download failed!".to_string();
                    status.last_error = Some(message.clone());
                }
                self.set_state(RunState::Failed).await;
                error!(url = %request.url, code = e.error_code(), error = %e, "download failed");
                self.emit_event(Event::Finished {
                    state: RunState::Failed,
                    error: Some(message),
                });
                Err(e)
            }
        };

        self.set_state(RunState::Idle).await;
        result
    }

    async fn execute(&self, request: &DownloadRequest, cancel: &CancellationToken) -> Result<()> {
        self.set_state(RunState::Validating).await;
        validate(request).await?;

        self.set_state(RunState::Provisioning).await;
        self.set_message("Preparing...").await;
        let tools = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            tools = self.resolve_tools() => tools?,
        };

        let spec = self.builder.build(request, &tools);
        self.log_line(format!("Running command: {}", spec.display_line()))
            .await;

        self.record_attempt(request).await;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.set_state(RunState::Running).await;
        self.set_message("Downloading...").await;
        let run = self.launcher.launch(&spec, cancel.clone()).await?;
        self.consume(run).await
    }

    async fn resolve_tools(&self) -> Result<ToolSet> {
        let root = &self.config.tools.install_root;
        self.tools
            .get_or_try_init(|| self.provider.ensure(root))
            .await
            .cloned()
    }

    /// Write the pending history entry; failures are logged and otherwise ignored
    async fn record_attempt(&self, request: &DownloadRequest) {
        let entry = HistoryEntry::for_request(request);
        match self
            .history
            .append(&request.destination_folder, entry.clone())
            .await
        {
            Ok(()) => self.emit_event(Event::HistoryRecorded { entry }),
            Err(e) => {
                warn!(error = %e, "failed to record download history");
                self.log_line(format!("Warning: could not save history: {e}"))
                    .await;
            }
        }
    }

    /// Follow the process until its terminal event
    async fn consume(&self, mut run: ProcessRun) -> Result<()> {
        let tail_capacity = self.config.process.stderr_tail_lines;
        let mut stderr_tail: VecDeque<String> = VecDeque::new();

        while let Some(event) = run.next_event().await {
            match event {
                ProcessEvent::Started { pid } => {
                    self.log_line(format!("Process started (ID: {pid})")).await;
                }
                ProcessEvent::StdOut { line } => {
                    debug!(line = %line, "extractor output");
                    if let Some(percent) = ProgressExtractor::extract(&line) {
                        self.set_progress(ProgressState::from_percent(percent)).await;
                    }
                    self.log_line(line).await;
                }
                ProcessEvent::StdErr { line } => {
                    debug!(line = %line, "extractor error output");
                    self.log_line(format!("ERROR: {line}")).await;
                    if tail_capacity > 0 {
                        if stderr_tail.len() == tail_capacity {
                            stderr_tail.pop_front();
                        }
                        stderr_tail.push_back(line);
                    }
                }
                ProcessEvent::Exited { code } => {
                    let shown = code.map_or_else(|| "none".to_string(), |c| c.to_string());
                    self.log_line(format!("Process exited (Code: {shown})")).await;
                    return match code {
                        Some(0) => Ok(()),
                        code => Err(Error::ProcessRuntime {
                            code,
                            stderr_tail: stderr_tail.into(),
                        }),
                    };
                }
                ProcessEvent::Aborted { code } => {
                    info!(code = ?code, "extractor aborted");
                    self.log_line("Process aborted").await;
                    return Err(Error::Cancelled);
                }
            }
        }

        Err(Error::ProcessRuntime {
            code: None,
            stderr_tail: stderr_tail.into(),
        })
    }
}

async fn validate(request: &DownloadRequest) -> std::result::Result<(), ValidationError> {
    let url = request.url.trim();
    if url.is_empty() {
        return Err(ValidationError::EmptyUrl);
    }

    let parsed = url::Url::parse(url).map_err(|e| ValidationError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ValidationError::UnsupportedScheme {
            scheme: parsed.scheme().to_string(),
        });
    }

    let folder = &request.destination_folder;
    match tokio::fs::metadata(folder).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(ValidationError::DestinationNotDirectory {
            path: folder.clone(),
        }),
        Err(_) => Err(ValidationError::DestinationMissing {
            path: folder.clone(),
        }),
    }
}
