//! Frame delivery statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;
use serde::Serialize;

/// Point-in-time view of a session's frame counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameStatsSnapshot {
    /// Frames handed to the frame sink.
    pub delivered: u64,

    /// Frames dropped because no sink was registered.
    pub dropped_no_sink: u64,

    /// Frames dropped because the buffer did not match its dimensions.
    pub dropped_malformed: u64,

    /// Frames that arrived while this session was not capturing.
    pub dropped_inactive: u64,

    /// Average delivered frames per second since capture started.
    pub fps: f32,

    /// Seconds since capture started.
    pub uptime_seconds: u64,
}

/// Counts what the callback bridge does with incoming frames.
pub(crate) struct FrameStats {
    start_time: RwLock<Option<Instant>>,
    delivered: AtomicU64,
    dropped_no_sink: AtomicU64,
    dropped_malformed: AtomicU64,
    dropped_inactive: AtomicU64,
}

impl FrameStats {
    pub fn new() -> Self {
        Self {
            start_time: RwLock::new(None),
            delivered: AtomicU64::new(0),
            dropped_no_sink: AtomicU64::new(0),
            dropped_malformed: AtomicU64::new(0),
            dropped_inactive: AtomicU64::new(0),
        }
    }

    /// Mark the start of a capture run.
    pub fn start(&self) {
        *self.start_time.write() = Some(Instant::now());
    }

    /// Mark the end of a capture run.
    pub fn stop(&self) {
        *self.start_time.write() = None;
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_no_sink(&self) {
        self.dropped_no_sink.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.dropped_malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inactive(&self) {
        self.dropped_inactive.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FrameStatsSnapshot {
        let delivered = self.delivered.load(Ordering::Relaxed);
        let elapsed = self.start_time.read().map(|start| start.elapsed());

        let fps = match elapsed {
            Some(elapsed) if elapsed.as_secs_f32() > 0.0 => {
                delivered as f32 / elapsed.as_secs_f32()
            }
            _ => 0.0,
        };

        FrameStatsSnapshot {
            delivered,
            dropped_no_sink: self.dropped_no_sink.load(Ordering::Relaxed),
            dropped_malformed: self.dropped_malformed.load(Ordering::Relaxed),
            dropped_inactive: self.dropped_inactive.load(Ordering::Relaxed),
            fps,
            uptime_seconds: elapsed.map(|e| e.as_secs()).unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = FrameStats::new();
        stats.record_delivered();
        stats.record_delivered();
        stats.record_no_sink();
        stats.record_malformed();
        stats.record_inactive();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.delivered, 2);
        assert_eq!(snapshot.dropped_no_sink, 1);
        assert_eq!(snapshot.dropped_malformed, 1);
        assert_eq!(snapshot.dropped_inactive, 1);
        assert_eq!(snapshot.fps, 0.0);
        assert_eq!(snapshot.uptime_seconds, 0);
    }
}
