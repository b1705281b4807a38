//! Child process supervision for the extraction tool
//!
//! [`ProcessRunner::run`] spawns the tool and turns its lifecycle into an ordered
//! stream of [`ProcessEvent`]s:
//!
//! - `Started` is always the first event
//! - `StdOut` / `StdErr` lines follow in arrival order, each pipe in its own order
//! - `Exited` (normal exit) or `Aborted` (cancelled) is always the last event
//!
//! Two reader tasks forward lines into a bounded channel, so a slow consumer
//! applies backpressure to the pipes instead of growing a buffer. A supervisor task
//! waits for the child and both readers before sending `Exited`, which means every
//! line the tool flushed is delivered before the exit event.

use crate::config::ProcessConfig;
use crate::command::CommandSpec;
use crate::error::{Error, Result};
use crate::types::ProcessEvent;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Longest output line delivered as one event
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Launches the extraction tool for a prepared command
///
/// [`ProcessRunner`] is the real implementation; tests substitute scripted ones.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Start `spec` and return its event stream
    ///
    /// Cancelling `cancel` terminates the process and ends the stream with
    /// [`ProcessEvent::Aborted`].
    async fn launch(&self, spec: &CommandSpec, cancel: CancellationToken) -> Result<ProcessRun>;
}

/// Event stream of one running (or finished) child process
///
/// The stream is finite and cannot be restarted. Dropping it before the terminal
/// event terminates the process.
#[derive(Debug)]
pub struct ProcessRun {
    pid: u32,
    rx: mpsc::Receiver<ProcessEvent>,
}

impl ProcessRun {
    /// Wrap a receiver of process events
    ///
    /// Senders must deliver `Started` first and exactly one terminal event last.
    pub fn new(pid: u32, rx: mpsc::Receiver<ProcessEvent>) -> Self {
        Self { pid, rx }
    }

    /// OS process id of the child
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Next event, `None` once the terminal event has been consumed
    pub async fn next_event(&mut self) -> Option<ProcessEvent> {
        self.rx.recv().await
    }
}

impl Stream for ProcessRun {
    type Item = ProcessEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Spawns child processes and supervises them until exit or cancellation
#[derive(Clone, Debug)]
pub struct ProcessRunner {
    config: ProcessConfig,
}

impl ProcessRunner {
    /// Create a runner with the given process settings
    pub fn new(config: ProcessConfig) -> Self {
        Self { config }
    }

    /// Spawn `spec` and stream its events
    ///
    /// Fails with [`Error::ProcessLaunch`] if the executable cannot be started.
    /// Every other outcome, including a non-zero exit, is reported through the
    /// stream.
    pub async fn run(&self, spec: &CommandSpec, cancel: CancellationToken) -> Result<ProcessRun> {
        let mut command = Command::new(&spec.executable);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(windows)]
        command.creation_flags(CREATE_NO_WINDOW);

        let mut child = command.spawn().map_err(|e| Error::ProcessLaunch {
            executable: spec.executable.clone(),
            reason: e.to_string(),
        })?;

        let pid = child.id().unwrap_or_default();
        tracing::info!(pid, executable = %spec.executable.display(), "process started");

        let (tx, rx) = mpsc::channel(self.config.event_buffer.max(1));
        // the receiver is still held here, so this cannot fail
        tx.send(ProcessEvent::Started { pid }).await.ok();

        let stdout = child
            .stdout
            .take()
            .map(|out| tokio::spawn(pump_lines(out, tx.clone(), |line| ProcessEvent::StdOut { line })));
        let stderr = child
            .stderr
            .take()
            .map(|err| tokio::spawn(pump_lines(err, tx.clone(), |line| ProcessEvent::StdErr { line })));
        let readers: Vec<JoinHandle<()>> = stdout.into_iter().chain(stderr).collect();

        tokio::spawn(supervise(
            child,
            pid,
            readers,
            tx,
            cancel,
            self.config.kill_grace_period,
        ));

        Ok(ProcessRun::new(pid, rx))
    }
}

#[async_trait]
impl ProcessLauncher for ProcessRunner {
    async fn launch(&self, spec: &CommandSpec, cancel: CancellationToken) -> Result<ProcessRun> {
        self.run(spec, cancel).await
    }
}

/// Forward every line of `reader` until EOF or until the receiver is gone
///
/// A line longer than [`MAX_LINE_BYTES`] is delivered in several pieces.
async fn pump_lines<R>(reader: R, tx: mpsc::Sender<ProcessEvent>, wrap: fn(String) -> ProcessEvent)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let mut limited = (&mut reader).take(MAX_LINE_BYTES as u64);
        match limited.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if tx.send(wrap(decode_line(&buf))).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to read process output");
                break;
            }
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

async fn supervise(
    mut child: Child,
    pid: u32,
    mut readers: Vec<JoinHandle<()>>,
    tx: mpsc::Sender<ProcessEvent>,
    cancel: CancellationToken,
    grace: Duration,
) {
    let status = tokio::select! {
        status = child.wait() => Some(status),
        _ = cancel.cancelled() => None,
        _ = tx.closed() => None,
    };

    let Some(status) = status else {
        abort_readers(&readers);
        let code = terminate(&mut child, pid, grace).await;
        tracing::info!(pid, code = ?code, "process aborted");
        tx.send(ProcessEvent::Aborted { code }).await.ok();
        return;
    };

    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            tracing::error!(pid, error = %e, "failed to wait for process");
            None
        }
    };

    // pipes may stay open after exit if the tool left children behind
    let drained = tokio::select! {
        _ = join_readers(&mut readers) => true,
        _ = cancel.cancelled() => false,
        _ = tx.closed() => false,
    };
    if !drained {
        abort_readers(&readers);
        tracing::info!(pid, code = ?code, "process aborted after exit");
        tx.send(ProcessEvent::Aborted { code }).await.ok();
        return;
    }

    tracing::info!(pid, code = ?code, "process exited");
    tx.send(ProcessEvent::Exited { code }).await.ok();
}

async fn join_readers(readers: &mut [JoinHandle<()>]) {
    for reader in readers.iter_mut() {
        if let Err(e) = reader.await {
            tracing::warn!(error = %e, "output reader task failed");
        }
    }
}

fn abort_readers(readers: &[JoinHandle<()>]) {
    for reader in readers {
        reader.abort();
    }
}

/// Ask the child to stop, force-kill it after `grace`, and return its exit code
async fn terminate(child: &mut Child, pid: u32, grace: Duration) -> Option<i32> {
    if let Ok(Some(status)) = child.try_wait() {
        return status.code();
    }

    request_stop(child, pid);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => status.code(),
        Ok(Err(e)) => {
            tracing::warn!(pid, error = %e, "failed to wait for terminated process");
            None
        }
        Err(_) => {
            tracing::warn!(pid, grace = ?grace, "process ignored termination, killing");
            if let Err(e) = child.kill().await {
                tracing::warn!(pid, error = %e, "failed to kill process");
            }
            child.try_wait().ok().flatten().and_then(|status| status.code())
        }
    }
}

#[cfg(unix)]
fn request_stop(child: &mut Child, pid: u32) {
    let Ok(raw_pid) = libc::pid_t::try_from(pid) else {
        child.start_kill().ok();
        return;
    };
    // SAFETY: the child has not been reaped yet, so its pid still refers to it.
    let rc = unsafe { libc::kill(raw_pid, libc::SIGTERM) };
    if rc != 0 {
        tracing::warn!(pid, error = %std::io::Error::last_os_error(), "failed to send SIGTERM");
    }
}

#[cfg(not(unix))]
fn request_stop(child: &mut Child, pid: u32) {
    if let Err(e) = child.start_kill() {
        tracing::warn!(pid, error = %e, "failed to stop process");
    }
}
