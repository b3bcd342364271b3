//! Monotonic microsecond clock
//!
//! All timing in the capture core runs on a single monotonic microsecond
//! timeline anchored at process start. `u64` microseconds give ~584k years
//! of range, so wraparound never occurs in practice.

use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Microseconds elapsed since the first call in this process.
#[must_use]
pub fn monotonic_us() -> u64 {
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_micros() as u64
}
