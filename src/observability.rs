// SPDX-License-Identifier: MIT
//! Structured-logging helpers: stage latency tracking and byte formatting.

use std::time::Instant;

use tracing::{debug, info};

/// Stages slower than this log at `info` instead of `debug`.
const SLOW_STAGE_MS: u128 = 1_000;

/// Tracks how long a pipeline stage ran and emits one structured log event.
pub struct StageTimer {
    stage: &'static str,
    start: Instant,
}

impl StageTimer {
    pub fn start(stage: &'static str) -> Self {
        debug!(stage, "stage starting");
        Self {
            stage,
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let elapsed_ms = self.start.elapsed().as_millis();
        if elapsed_ms > SLOW_STAGE_MS {
            info!(stage = self.stage, elapsed_ms = elapsed_ms as u64, "stage complete (slow)");
        } else {
            debug!(stage = self.stage, elapsed_ms = elapsed_ms as u64, "stage complete");
        }
    }
}

/// Human-readable byte count for log lines. Screenshot artifacts top out in
/// the tens of megabytes, so MB is the largest unit.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
