//! Progress reporting
//!
//! The orchestrator and the mover report after every file. Sinks must not
//! block: the channel sink queues events for a consumer on another task.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// Which batch job is reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    Classifying,
    Moving,
}

/// Progress event for UI updates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub phase: ProgressPhase,
    /// 1-based index of the file just finished
    pub current: usize,
    pub total: usize,
    pub current_file: Option<String>,
}

pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn report(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Queues events on an unbounded channel. A closed receiver is ignored.
impl ProgressSink for UnboundedSender<ProgressEvent> {
    fn report(&self, event: ProgressEvent) {
        let _ = self.send(event);
    }
}
