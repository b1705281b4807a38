//! Scripted collaborators for orchestrator tests

use crate::command::CommandSpec;
use crate::config::Config;
use crate::error::{Error, ProvisioningError, Result};
use crate::orchestrator::DownloadOrchestrator;
use crate::provision::ToolProvider;
use crate::runner::{ProcessLauncher, ProcessRun};
use crate::types::{DownloadRequest, FormatProfile, ProcessEvent, ToolSet};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

pub(crate) const PLAYLIST_URL: &str = "https://www.youtube.com/playlist?list=PLtest";

/// Provider returning a fixed tool set and counting calls
#[derive(Default)]
pub(crate) struct FixedTools {
    pub(crate) calls: AtomicUsize,
    pub(crate) fail: bool,
}

impl FixedTools {
    pub(crate) fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolProvider for FixedTools {
    async fn ensure(&self, root: &Path) -> Result<ToolSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProvisioningError::HttpStatus {
                url: "https://example.invalid/yt-dlp".into(),
                status: 404,
            }
            .into());
        }
        Ok(ToolSet {
            extractor_path: root.join("bin").join("yt-dlp"),
            transcoder_bin_dir: root.join("bin").join("ffmpeg"),
        })
    }
}

/// Launcher replaying a fixed list of events
pub(crate) struct ScriptedLauncher {
    events: Vec<ProcessEvent>,
    pub(crate) launched: Mutex<Vec<CommandSpec>>,
}

impl ScriptedLauncher {
    pub(crate) fn new(events: Vec<ProcessEvent>) -> Self {
        Self {
            events,
            launched: Mutex::new(Vec::new()),
        }
    }

    /// Started, the given stdout lines, then `Exited { code }`
    pub(crate) fn stdout_then_exit(lines: &[&str], code: i32) -> Self {
        let mut events = vec![ProcessEvent::Started { pid: 4242 }];
        events.extend(lines.iter().map(|line| ProcessEvent::StdOut {
            line: line.to_string(),
        }));
        events.push(ProcessEvent::Exited { code: Some(code) });
        Self::new(events)
    }
}

#[async_trait]
impl ProcessLauncher for ScriptedLauncher {
    async fn launch(&self, spec: &CommandSpec, _cancel: CancellationToken) -> Result<ProcessRun> {
        self.launched.lock().await.push(spec.clone());
        let (tx, rx) = mpsc::channel(self.events.len().max(1));
        for event in &self.events {
            tx.send(event.clone()).await.ok();
        }
        Ok(ProcessRun::new(4242, rx))
    }
}

/// Launcher whose process runs until cancelled, then reports `Aborted`
#[derive(Default)]
pub(crate) struct BlockingLauncher {
    pub(crate) launches: AtomicUsize,
}

#[async_trait]
impl ProcessLauncher for BlockingLauncher {
    async fn launch(&self, _spec: &CommandSpec, cancel: CancellationToken) -> Result<ProcessRun> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(8);
        tx.send(ProcessEvent::Started { pid: 7 }).await.ok();
        tx.send(ProcessEvent::StdOut {
            line: "[download]  10.0% of 5.00MiB".into(),
        })
        .await
        .ok();
        tokio::spawn(async move {
            cancel.cancelled().await;
            tx.send(ProcessEvent::Aborted { code: None }).await.ok();
        });
        Ok(ProcessRun::new(7, rx))
    }
}

/// Launcher that cannot start the process
pub(crate) struct BrokenLauncher;

#[async_trait]
impl ProcessLauncher for BrokenLauncher {
    async fn launch(&self, spec: &CommandSpec, _cancel: CancellationToken) -> Result<ProcessRun> {
        Err(Error::ProcessLaunch {
            executable: spec.executable.clone(),
            reason: "No such file or directory (os error 2)".into(),
        })
    }
}

/// Orchestrator wired to the given collaborators, installing tools under a temp dir
///
/// Returns the orchestrator, the destination folder and the tempdir (which must be kept alive).
pub(crate) fn create_test_orchestrator(
    provider: Arc<dyn ToolProvider>,
    launcher: Arc<dyn ProcessLauncher>,
) -> (DownloadOrchestrator, PathBuf, tempfile::TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let destination = temp_dir.path().join("music");
    std::fs::create_dir_all(&destination).unwrap();

    let mut config = Config::default();
    config.tools.install_root = temp_dir.path().join("tools");

    let orchestrator = DownloadOrchestrator::with_components(config, provider, launcher);
    (orchestrator, destination, temp_dir)
}

pub(crate) fn video_request(destination: &Path) -> DownloadRequest {
    DownloadRequest::new(PLAYLIST_URL, FormatProfile::Video, destination)
}

/// Provider that never finishes, to hold a run in the provisioning state
pub(crate) struct StalledTools;

#[async_trait]
impl ToolProvider for StalledTools {
    async fn ensure(&self, _root: &Path) -> Result<ToolSet> {
        std::future::pending().await
    }
}

/// Poll until the orchestrator reports `state`, panicking after five seconds
pub(crate) async fn wait_for_state(orchestrator: &DownloadOrchestrator, state: crate::types::RunState) {
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while orchestrator.status().await.state != state {
        assert!(
            tokio::time::Instant::now() < deadline,
            "orchestrator never reached {state:?}"
        );
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
}
