//! Custom test assertions for integration tests

use playlist_dl::{DownloadOrchestrator, Event, RunState};
use std::time::Duration;
use tokio::sync::broadcast;

/// Wait until the orchestrator reports `state`
///
/// Returns `false` on timeout.
pub async fn wait_for_state(
    orchestrator: &DownloadOrchestrator,
    state: RunState,
    timeout: Duration,
) -> bool {
    tokio::time::timeout(timeout, async {
        while orchestrator.status().await.state != state {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

/// Collect events until the run reports `Finished`
pub async fn collect_until_finished(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
) -> Vec<Event> {
    let mut collected = Vec::new();
    let _ = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let done = matches!(event, Event::Finished { .. });
                    collected.push(event);
                    if done {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    })
    .await;
    collected
}

/// Progress fractions seen in `events`, in order
pub fn progress_fractions(events: &[Event]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Progress { progress } => Some(progress.fraction),
            _ => None,
        })
        .collect()
}
