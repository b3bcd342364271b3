//! Capture counters (observability only)
//!
//! Updated from the capture thread with relaxed atomics; read from
//! anywhere. Nothing in the capture path ever branches on these.

use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals for the capture loop.
#[derive(Default)]
pub struct CaptureStats {
    new_frames: AtomicU64,
    stale_polls: AtomicU64,
    /// Time spent on polls that produced no new frame.
    wasted_poll_us: AtomicU64,
    snapshot_errors: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub new_frames: u64,
    pub stale_polls: u64,
    pub wasted_poll_us: u64,
    pub snapshot_errors: u64,
}

impl CaptureStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_new_frame(&self) {
        self.new_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_poll(&self, wasted_us: u64) {
        self.stale_polls.fetch_add(1, Ordering::Relaxed);
        self.wasted_poll_us.fetch_add(wasted_us, Ordering::Relaxed);
    }

    pub fn record_snapshot_error(&self) {
        self.snapshot_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            new_frames: self.new_frames.load(Ordering::Relaxed),
            stale_polls: self.stale_polls.load(Ordering::Relaxed),
            wasted_poll_us: self.wasted_poll_us.load(Ordering::Relaxed),
            snapshot_errors: self.snapshot_errors.load(Ordering::Relaxed),
        }
    }
}
