//! Pipeline counters.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Snapshot of what the worker has done since the pipeline was created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Frames taken off the intake queue
    pub frames_received: u64,
    /// Frames ignored because they repeated the previous stream and number
    pub frames_duplicate: u64,
    /// Frame sets produced by the synchronizer
    pub framesets_emitted: u64,
    /// Of those, sets missing at least one expected stream
    pub partial_framesets: u64,
    /// Filter stages skipped because they failed
    pub filter_failures: u64,
    /// Sets that produced no point cloud
    pub mapping_unavailable: u64,
    /// Results written to the output queue
    pub results_published: u64,
    /// Results evicted from the output queue before anyone polled them
    pub results_dropped: u64,
    /// Frames evicted from the intake queue before the worker saw them
    pub intake_dropped: u64,
    /// Diagnostic events lost because the event channel was full
    pub events_dropped: u64,
    /// Running average of cycle time, in microseconds
    pub avg_cycle_us: f64,
    /// Duration of the last cycle, in microseconds
    pub last_cycle_us: u64,
}

impl PipelineStats {
    /// Fold one processing cycle into the timing fields.
    pub fn record_cycle(&mut self, elapsed: Duration) {
        let us = elapsed.as_micros() as u64;
        self.last_cycle_us = us;
        let n = self.framesets_emitted.max(1) as f64;
        self.avg_cycle_us += (us as f64 - self.avg_cycle_us) / n;
    }

    /// Share of emitted sets that were complete, as a percentage.
    pub fn completion_rate(&self) -> f64 {
        if self.framesets_emitted == 0 {
            100.0
        } else {
            let complete = self.framesets_emitted - self.partial_framesets.min(self.framesets_emitted);
            complete as f64 / self.framesets_emitted as f64 * 100.0
        }
    }
}
