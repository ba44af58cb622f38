use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters for one recording loop, shared with the recorder through an `Arc`
#[derive(Debug, Default)]
pub struct LoopMetrics {
    ticks: AtomicU64,
    degraded_ticks: AtomicU64,
    overruns: AtomicU64,
    camera_misses: AtomicU64,
    sink_errors: AtomicU64,
    total_latency_us: AtomicU64,
}

/// Point-in-time copy of [`LoopMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    pub ticks: u64,
    pub degraded_ticks: u64,
    pub overruns: u64,
    pub camera_misses: u64,
    pub sink_errors: u64,
    pub avg_tick_latency_us: u64,
}

impl LoopMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn degraded_ticks(&self) -> u64 {
        self.degraded_ticks.load(Ordering::Relaxed)
    }

    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    pub fn camera_misses(&self) -> u64 {
        self.camera_misses.load(Ordering::Relaxed)
    }

    pub fn sink_errors(&self) -> u64 {
        self.sink_errors.load(Ordering::Relaxed)
    }

    pub fn start_tick(&self) -> Instant {
        Instant::now()
    }

    /// Record a finished tick and return how long it took
    pub fn finish_tick(&self, start: Instant) -> Duration {
        let elapsed = start.elapsed();
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        elapsed
    }

    pub fn record_degraded(&self) {
        self.degraded_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_camera_misses(&self, count: u64) {
        self.camera_misses.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_sink_error(&self) {
        self.sink_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_tick_latency_us(&self) -> u64 {
        let ticks = self.ticks();
        if ticks == 0 {
            return 0;
        }
        self.total_latency_us.load(Ordering::Relaxed) / ticks
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks: self.ticks(),
            degraded_ticks: self.degraded_ticks(),
            overruns: self.overruns(),
            camera_misses: self.camera_misses(),
            sink_errors: self.sink_errors(),
            avg_tick_latency_us: self.avg_tick_latency_us(),
        }
    }
}
