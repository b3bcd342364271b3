//! Frame arrival prediction
//!
//! The compositor gives no reliable "new frame rendered" event, so the
//! capture thread has to guess when the next frame is due from the arrival
//! times of frames it has already seen. Two strategies share one contract:
//!
//! - **Inferred**: keep a short history of accepted-frame timestamps and
//!   estimate the source interval from a low percentile of the observed
//!   gaps. The history must stay small so the estimate catches up quickly
//!   when the source rate changes (e.g. menu <-> ingame transitions).
//! - **Edge-notified**: the compositor fires a per-refresh callback, so no
//!   statistics are needed; the interval is the nominal target rate.

/// Accepted-frame timestamps kept for interval estimation.
const HISTORY_CAPACITY: usize = 30;

/// Most recent arrival older than this means the display is idle.
const IDLE_THRESHOLD_US: u64 = 60_000_000;

/// Poll interval assumed while idle.
const IDLE_INTERVAL_US: u64 = 500_000;

/// Most recent arrival older than this (but not idle) caps the interval.
const STALE_THRESHOLD_US: u64 = 100_000;

/// Upper clamp on any inferred interval.
const MAX_INTERVAL_US: u64 = 100_000;

/// Fixed-capacity ring of monotonic arrival timestamps, newest-first
/// indexed, oldest entry silently overwritten when full. Only accepted
/// ("new frame") polls are recorded here, never stale ones.
#[derive(Debug)]
pub struct ArrivalHistory {
    entries: [u64; HISTORY_CAPACITY],
    tail: usize,
    len: usize,
}

impl Default for ArrivalHistory {
    fn default() -> Self {
        Self {
            entries: [0; HISTORY_CAPACITY],
            tail: 0,
            len: 0,
        }
    }
}

impl ArrivalHistory {
    pub fn push(&mut self, timestamp_us: u64) {
        self.entries[self.tail] = timestamp_us;
        self.tail = (self.tail + 1) % HISTORY_CAPACITY;
        if self.len < HISTORY_CAPACITY {
            self.len += 1;
        }
    }

    /// Nth most recent entry: 0 = newest, `len() - 1` = oldest.
    #[must_use]
    pub fn nth_most_recent(&self, n: usize) -> u64 {
        debug_assert!(n < self.len);
        self.entries[(self.tail + HISTORY_CAPACITY - 1 - n) % HISTORY_CAPACITY]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Shrink the effective history to the `keep` most recent entries.
    /// Used when the display has gone idle and old gaps no longer describe
    /// the source rate.
    pub fn truncate_to_most_recent(&mut self, keep: usize) {
        self.len = self.len.min(keep);
    }
}

/// Common contract for the two arrival strategies, selected once at
/// startup. Both require the process-wide monotonic microsecond clock;
/// `u64` microseconds never wrap in practice.
pub trait ArrivalPredictor: Send {
    /// Record an accepted new frame at `now_us`.
    fn on_arrival(&mut self, now_us: u64);

    /// Record that a poll happened at `now_us`, new frame or not.
    fn record_poll(&mut self, now_us: u64) {
        let _ = now_us;
    }

    /// Working estimate of the source frame interval, microseconds.
    fn estimate_interval_us(&mut self, now_us: u64) -> u64;

    /// Earliest time the next new frame is expected. Never earlier than
    /// the most recent recorded arrival, and never earlier than `now_us`
    /// when no arrivals have been recorded.
    fn predict_next_arrival_us(&mut self, now_us: u64) -> u64;
}

/// Statistically-inferred arrivals: no refresh signal exists, so the
/// source interval is the 40th percentile of recent inter-arrival gaps.
/// A low percentile reacts quickly when the source speeds up while staying
/// robust to the occasional long gap.
pub struct InferredPredictor {
    history: ArrivalHistory,
    target_interval_us: u64,
    /// Apply the long-sleep idle clamps. Off means the estimate is purely
    /// statistical.
    power_saving: bool,
    last_poll_us: u64,
}

impl InferredPredictor {
    #[must_use]
    pub fn new(target_interval_us: u64, power_saving: bool) -> Self {
        Self {
            history: ArrivalHistory::default(),
            target_interval_us: target_interval_us.max(1),
            power_saving,
            last_poll_us: 0,
        }
    }

    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Sorted-percentile estimate over consecutive newest-first gaps.
    fn percentile_interval_us(&self) -> u64 {
        let gap_count = self.history.len() - 1;
        if gap_count == 0 {
            return self.target_interval_us;
        }

        let mut gaps = Vec::with_capacity(gap_count);
        for i in 0..gap_count {
            gaps.push(self.history.nth_most_recent(i) - self.history.nth_most_recent(i + 1));
        }
        gaps.sort_unstable();
        let mut interval = gaps[gap_count * 2 / 5];

        // With bad luck the poll loop locks onto every second source frame,
        // which shows up as a doubled gap. Halve suspiciously long values.
        if interval >= 2 * self.target_interval_us {
            interval /= 2;
        }
        interval.min(MAX_INTERVAL_US).max(self.target_interval_us)
    }
}

impl ArrivalPredictor for InferredPredictor {
    fn on_arrival(&mut self, now_us: u64) {
        self.history.push(now_us);
    }

    fn record_poll(&mut self, now_us: u64) {
        self.last_poll_us = now_us;
    }

    fn estimate_interval_us(&mut self, now_us: u64) -> u64 {
        if self.history.is_empty() {
            return self.target_interval_us;
        }
        if self.power_saving {
            let most_recent = self.history.nth_most_recent(0);
            if now_us.saturating_sub(most_recent) > IDLE_THRESHOLD_US {
                // Idle for over a minute: old gaps say nothing about the
                // current rate, keep only the newest sample.
                self.history.truncate_to_most_recent(1);
                return IDLE_INTERVAL_US;
            }
            if now_us.saturating_sub(most_recent) > STALE_THRESHOLD_US {
                return STALE_THRESHOLD_US;
            }
        }
        self.percentile_interval_us()
    }

    fn predict_next_arrival_us(&mut self, now_us: u64) -> u64 {
        if self.history.is_empty() {
            return now_us;
        }
        let most_recent = self.history.nth_most_recent(0);

        if self.power_saving {
            if now_us.saturating_sub(most_recent) > IDLE_THRESHOLD_US {
                self.history.truncate_to_most_recent(1);
                return self.last_poll_us.max(most_recent) + STALE_THRESHOLD_US;
            }
            if now_us.saturating_sub(most_recent) > STALE_THRESHOLD_US {
                return self.last_poll_us.max(most_recent) + STALE_THRESHOLD_US;
            }
        }

        let interval = self.estimate_interval_us(now_us);

        // Frames are assumed to arrive at most_recent + k * interval. Find
        // the first such boundary at or after now.
        let k = now_us.saturating_sub(most_recent).div_ceil(interval);
        let next_arrival = most_recent + k * interval;
        // k may be 0 (poll landed exactly on the arrival timestamp), so the
        // previous boundary can sit before the clock epoch.
        let previous_boundary = next_arrival.saturating_sub(interval);

        // A boundary that passed less than a third of an interval ago was
        // probably a frame we just missed; report it as due right now
        // rather than waiting out a whole extra interval.
        if previous_boundary > most_recent && now_us - previous_boundary < interval / 3 {
            now_us
        } else {
            next_arrival
        }
    }
}

/// Edge-notified arrivals: the compositor calls back on every refresh, so
/// the predicted interval is simply the nominal target rate and the next
/// frame is always "now" (wakeups come from the callback, not from sleeps).
pub struct EdgeNotifiedPredictor {
    nominal_interval_us: u64,
}

impl EdgeNotifiedPredictor {
    #[must_use]
    pub fn new(nominal_interval_us: u64) -> Self {
        Self {
            nominal_interval_us: nominal_interval_us.max(1),
        }
    }
}

impl ArrivalPredictor for EdgeNotifiedPredictor {
    fn on_arrival(&mut self, _now_us: u64) {}

    fn estimate_interval_us(&mut self, _now_us: u64) -> u64 {
        self.nominal_interval_us
    }

    fn predict_next_arrival_us(&mut self, now_us: u64) -> u64 {
        now_us
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET_60HZ_US: u64 = 16_666;

    fn periodic_predictor(start_us: u64, period_us: u64, samples: usize) -> InferredPredictor {
        let mut p = InferredPredictor::new(TARGET_60HZ_US, true);
        for i in 0..samples {
            p.on_arrival(start_us + i as u64 * period_us);
        }
        p
    }

    #[test]
    fn test_empty_history_returns_target_interval() {
        let mut p = InferredPredictor::new(TARGET_60HZ_US, true);
        assert_eq!(p.estimate_interval_us(1_000_000), TARGET_60HZ_US);
    }

    #[test]
    fn test_single_sample_returns_target_interval() {
        let mut p = InferredPredictor::new(TARGET_60HZ_US, true);
        p.on_arrival(1_000_000);
        assert_eq!(p.estimate_interval_us(1_010_000), TARGET_60HZ_US);
    }

    #[test]
    fn test_periodic_history_estimates_the_period() {
        // 25ms period, below the doubled-interval cutoff for 60 Hz.
        let mut p = periodic_predictor(1_000_000, 25_000, 10);
        let now = 1_000_000 + 9 * 25_000 + 1_000;
        assert_eq!(p.estimate_interval_us(now), 25_000);
    }

    #[test]
    fn test_estimate_stays_within_clamp_bounds() {
        for period in [1_000u64, 10_000, 25_000, 30_000, 90_000] {
            let mut p = periodic_predictor(10_000_000, period, 12);
            let now = 10_000_000 + 11 * period + 500;
            let est = p.estimate_interval_us(now);
            assert!(est >= TARGET_60HZ_US, "period {period}: {est} below target");
            assert!(est <= 100_000, "period {period}: {est} above 100ms");
        }
    }

    #[test]
    fn test_doubled_interval_is_halved() {
        // 40ms gaps look like sampling every second 20ms frame.
        let mut p = periodic_predictor(1_000_000, 40_000, 10);
        let now = 1_000_000 + 9 * 40_000 + 1_000;
        assert_eq!(p.estimate_interval_us(now), 20_000);
    }

    #[test]
    fn test_idle_over_a_minute_returns_long_interval_and_shrinks_history() {
        let mut p = periodic_predictor(0, 20_000, 10);
        assert_eq!(p.history_len(), 10);
        let now = 9 * 20_000 + 61_000_000;
        assert_eq!(p.estimate_interval_us(now), 500_000);
        assert_eq!(p.history_len(), 1);
    }

    #[test]
    fn test_stale_over_100ms_returns_100ms() {
        let mut p = periodic_predictor(1_000_000, 20_000, 10);
        let now = 1_000_000 + 9 * 20_000 + 200_000;
        assert_eq!(p.estimate_interval_us(now), 100_000);
    }

    #[test]
    fn test_power_saving_off_skips_idle_clamps() {
        let mut p = InferredPredictor::new(TARGET_60HZ_US, false);
        for i in 0..10u64 {
            p.on_arrival(i * 20_000);
        }
        let now = 9 * 20_000 + 61_000_000;
        assert_eq!(p.estimate_interval_us(now), 20_000);
        assert_eq!(p.history_len(), 10);
    }

    #[test]
    fn test_estimate_is_idempotent_between_arrivals() {
        let mut p = periodic_predictor(1_000_000, 25_000, 10);
        let now = 1_000_000 + 9 * 25_000 + 2_000;
        let first = p.estimate_interval_us(now);
        assert_eq!(p.estimate_interval_us(now), first);
        assert_eq!(p.estimate_interval_us(now), first);
    }

    #[test]
    fn test_predict_with_empty_history_is_now() {
        let mut p = InferredPredictor::new(TARGET_60HZ_US, true);
        assert_eq!(p.predict_next_arrival_us(5_000_000), 5_000_000);
    }

    #[test]
    fn test_predict_aligns_to_interval_boundary_after_last_arrival() {
        // 20ms period, last arrival at 1_180_000; 25ms later the next
        // boundary is 1_220_000 and the previous one (1_200_000) passed
        // 5ms ago, within interval/3, so the frame counts as due now.
        let mut p = periodic_predictor(1_000_000, 20_000, 10);
        let last = 1_000_000 + 9 * 20_000;
        let now = last + 25_000;
        assert_eq!(p.predict_next_arrival_us(now), now);

        // 15ms later the 1_200_000 boundary is still ahead: predict it.
        let now = last + 15_000;
        assert_eq!(p.predict_next_arrival_us(now), last + 20_000);
    }

    #[test]
    fn test_predict_never_before_most_recent_arrival() {
        let mut p = periodic_predictor(1_000_000, 20_000, 10);
        p.record_poll(1_180_000);
        let last = 1_000_000 + 9 * 20_000;
        for offset in [0u64, 1_000, 19_999, 50_000, 150_000, 61_000_000] {
            let predicted = p.predict_next_arrival_us(last + offset);
            assert!(predicted >= last, "offset {offset}: {predicted} < {last}");
        }
    }

    #[test]
    fn test_predict_handles_arrival_near_clock_epoch() {
        // A frame recorded within the first target interval of the clock
        // epoch, queried at that same microsecond: the boundary before the
        // arrival lies before the epoch and must not underflow.
        let mut p = InferredPredictor::new(TARGET_60HZ_US, true);
        p.on_arrival(5_000);
        let predicted = p.predict_next_arrival_us(5_000);
        assert!(predicted >= 5_000);

        // Same shape with history: two early arrivals, queried right on
        // the newest one.
        let mut p = InferredPredictor::new(TARGET_60HZ_US, true);
        p.on_arrival(0);
        p.on_arrival(16_666);
        assert!(p.predict_next_arrival_us(16_666) >= 16_666);
    }

    #[test]
    fn test_edge_notified_uses_fixed_nominal_interval() {
        let mut p = EdgeNotifiedPredictor::new(TARGET_60HZ_US);
        p.on_arrival(123);
        assert_eq!(p.estimate_interval_us(999_999), TARGET_60HZ_US);
        assert_eq!(p.predict_next_arrival_us(42), 42);
    }
}
