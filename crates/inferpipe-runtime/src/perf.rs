//! Throughput and latency accounting
//!
//! Updated only when a result is drained in order, under the pipeline
//! lock. Latency is measured from submission to extraction, so time spent
//! parked in the reorder buffer counts.

use std::time::{Duration, Instant};

/// Snapshot of pipeline performance counters
#[derive(Debug, Clone, Default)]
pub struct PerfInfo {
    /// Results delivered so far
    pub frames_count: u64,
    /// Sum of per-result latencies
    pub latency_sum: Duration,
    /// Results per second since the first submission
    pub fps: f64,
    /// First submission time, if any
    pub start_time: Option<Instant>,
    /// Workers in use observed at the latest submission
    pub requests_in_use: usize,
}

impl PerfInfo {
    /// Mean submission-to-delivery latency
    pub fn mean_latency(&self) -> Duration {
        if self.frames_count == 0 {
            return Duration::ZERO;
        }
        let nanos = self.latency_sum.as_nanos() / self.frames_count as u128;
        Duration::from_nanos(nanos as u64)
    }
}

/// Mutable counters owned by the pipeline state
#[derive(Debug, Default)]
pub struct PerfTracker {
    info: PerfInfo,
}

impl PerfTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch the pipeline start on the first submission.
    pub fn mark_submit(&mut self, now: Instant, in_use: usize) {
        if self.info.start_time.is_none() {
            self.info.start_time = Some(now);
        }
        self.info.requests_in_use = in_use;
    }

    /// Account for one result drained at `now`.
    pub fn record(&mut self, now: Instant, started: Instant) {
        self.info.latency_sum += now.saturating_duration_since(started);
        self.info.frames_count += 1;

        let elapsed_ms = self
            .info
            .start_time
            .map(|start| now.saturating_duration_since(start).as_secs_f64() * 1000.0)
            .unwrap_or(0.0);
        self.info.fps = if elapsed_ms > 0.0 {
            self.info.frames_count as f64 * 1000.0 / elapsed_ms
        } else {
            0.0
        };
    }

    #[inline]
    pub fn snapshot(&self) -> PerfInfo {
        self.info.clone()
    }
}
