//! Progress tracking for one execution run.
//!
//! Monotonic start timestamp plus completed/total counters; derives
//! elapsed milliseconds and a percentage for the `progress` callback.

use serde::Serialize;
use tokio::time::Instant;

/// Snapshot handed to the `progress` callback after each stage completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressInfo {
    pub completed: usize,
    pub total: usize,
    pub elapsed_ms: u64,
    pub percentage: f64,
}

/// Tracks completion progress over a run.
///
/// **Interaction**: Owned by the coordinator; `update` is called with
/// committed + in-batch counts after every stage completion; `reset` on
/// stateful re-entry.
#[derive(Debug)]
pub struct ProgressTracker {
    started: Instant,
    total: usize,
    completed: usize,
}

impl ProgressTracker {
    /// Starts tracking a run of `total` stages; the clock starts now.
    pub fn new(total: usize) -> Self {
        Self {
            started: Instant::now(),
            total,
            completed: 0,
        }
    }

    /// Sets the completed count.
    pub fn update(&mut self, completed: usize) {
        self.completed = completed;
    }

    /// Current progress snapshot. `percentage` is 0 for an empty run.
    pub fn info(&self) -> ProgressInfo {
        let percentage = if self.total == 0 {
            0.0
        } else {
            (self.completed as f64 / self.total as f64) * 100.0
        };
        ProgressInfo {
            completed: self.completed,
            total: self.total,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            percentage,
        }
    }

    /// True once every stage completed.
    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }

    /// Restarts the clock and zeroes the completed count.
    pub fn reset(&mut self) {
        self.started = Instant::now();
        self.completed = 0;
    }
}
