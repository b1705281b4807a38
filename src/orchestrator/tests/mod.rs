use super::test_helpers::*;
use super::*;
use crate::error::{Error, ValidationError};
use crate::types::{DownloadRequest, Event, FormatProfile, ProcessEvent, RunState};
use std::time::Duration;


fn messages(lines: &[LogLine]) -> Vec<String> {
    lines.iter().map(|l| l.message.clone()).collect()
}

/// Collect broadcast events until the orchestrator returns to idle
async fn events_until_idle(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for events")
            .expect("event channel closed");
        let done = matches!(
            event,
            Event::StateChanged {
                state: RunState::Idle
            }
        );
        events.push(event);
        if done {
            return events;
        }
    }
}
