//! Run control: start, wait, abort

use super::DownloadOrchestrator;
use crate::error::{Error, Result};
use crate::types::{DownloadRequest, RunSummary};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to a started run
#[derive(Debug)]
pub struct RunHandle {
    join: JoinHandle<Result<RunSummary>>,
}

impl RunHandle {
    /// Wait for the run to reach a terminal state
    pub async fn wait(self) -> Result<RunSummary> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => Err(Error::Other(format!("download task failed: {e}"))),
        }
    }
}

/// Holds the busy flag for the lifetime of a run, including panics
struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl DownloadOrchestrator {
    /// Start a download in the background
    ///
    /// Returns [`Error::Busy`] right away if another run is active; the active run
    /// is not affected. Every other failure is reported by [`RunHandle::wait`].
    pub async fn start(&self, request: DownloadRequest) -> Result<RunHandle> {
        // abort() takes the same lock, so it never sees the flag set without a token
        let mut slot = self.cancel.lock().await;
        let Some(guard) = BusyGuard::acquire(&self.busy) else {
            tracing::warn!(url = %request.url, "download rejected, another run is active");
            return Err(Error::Busy);
        };

        let cancel = CancellationToken::new();
        *slot = Some(cancel.clone());
        drop(slot);

        let this = self.clone();
        let join = tokio::spawn(async move {
            let _guard = guard;
            let result = this.run(&request, &cancel).await;
            *this.cancel.lock().await = None;
            result
        });

        Ok(RunHandle { join })
    }

    /// Start a download and wait for it to finish
    pub async fn download(&self, request: DownloadRequest) -> Result<RunSummary> {
        self.start(request).await?.wait().await
    }

    /// Cancel the active run
    ///
    /// Returns `false` if no run was active. The run itself resolves to
    /// [`Error::Cancelled`].
    pub async fn abort(&self) -> bool {
        match self.cancel.lock().await.as_ref() {
            Some(token) => {
                tracing::info!("abort requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a run is active
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}
