//! Progress sinks. They observe stage events and never influence the run.

use tokio::sync::mpsc::UnboundedSender;

use hotelq_core::{ProgressSink, StageEvent};

/// Logs each stage event at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn on_stage(&self, event: &StageEvent) {
        tracing::info!(
            stage = %event.stage,
            changed = event.changed.len(),
            retry_count = event.retry_count,
            results = ?event.result_counts,
            "stage completed"
        );
    }
}

/// Forwards events to a channel, e.g. one drained by a websocket writer.
/// A closed receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: UnboundedSender<StageEvent>,
}

impl ChannelProgress {
    pub fn new(tx: UnboundedSender<StageEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgress {
    fn on_stage(&self, event: &StageEvent) {
        if self.tx.send(event.clone()).is_err() {
            tracing::debug!(stage = %event.stage, "progress receiver dropped");
        }
    }
}
