//! Producer/consumer handoff primitives
//!
//! `FrameNotifier` is the only coordination channel between the capture
//! thread and the consumer: a monotonic counter bumped once per accepted
//! frame plus a blocking wait. `VsyncSignal` is the minimal-work target for
//! the compositor's per-refresh callback in edge-notified mode.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Monotonic new-frame counter with a blocking wait.
///
/// Ordering invariant: the committed buffer write completes (and its lock
/// is released) before `notify` runs, and the counter is bumped with
/// release semantics under the wait mutex. A consumer that observes a new
/// counter value therefore observes the frame that produced it.
#[derive(Default)]
pub struct FrameNotifier {
    count: AtomicU64,
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl FrameNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counter value. Use as the `last_seen` argument of
    /// [`FrameNotifier::wait_for_change`].
    #[must_use]
    pub fn current(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Record one accepted frame and wake all waiting consumers.
    /// Capture thread only.
    pub fn notify(&self) {
        let _guard = self.mutex.lock();
        self.count.fetch_add(1, Ordering::Release);
        self.condvar.notify_all();
    }

    /// Block until the counter moves past `last_seen`, then return the new
    /// value. Spurious wakeups are absorbed by re-checking the counter.
    pub fn wait_for_change(&self, last_seen: u64) -> u64 {
        let mut guard = self.mutex.lock();
        loop {
            let current = self.count.load(Ordering::Acquire);
            if current != last_seen {
                return current;
            }
            self.condvar.wait(&mut guard);
        }
    }

    /// Like [`FrameNotifier::wait_for_change`] but gives up after `timeout`,
    /// returning `None` if the counter never moved.
    pub fn wait_for_change_timeout(&self, last_seen: u64, timeout: Duration) -> Option<u64> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.mutex.lock();
        loop {
            let current = self.count.load(Ordering::Acquire);
            if current != last_seen {
                return Some(current);
            }
            if self.condvar.wait_until(&mut guard, deadline).timed_out() {
                let current = self.count.load(Ordering::Acquire);
                return (current != last_seen).then_some(current);
            }
        }
    }
}

/// Edge-notified wakeup flag.
///
/// The compositor's refresh callback may run in a restrictive context, so
/// [`VsyncSignal::signal`] does the minimum possible work: one atomic store
/// and one wake. Everything heavier stays on the capture thread.
#[derive(Default)]
pub struct VsyncSignal {
    pending: AtomicBool,
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl VsyncSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a refresh as pending and wake the capture thread.
    /// Safe to call from any thread, including the compositor callback.
    pub fn signal(&self) {
        self.pending.store(true, Ordering::SeqCst);
        let _guard = self.mutex.lock();
        self.condvar.notify_one();
    }

    /// Wait until a refresh is pending or `timeout` elapses, consuming the
    /// pending flag. Returns true if a refresh was signalled.
    pub fn wait_and_clear(&self, timeout: Duration) -> bool {
        if self.pending.swap(false, Ordering::SeqCst) {
            return true;
        }
        let deadline = Instant::now() + timeout;
        let mut guard = self.mutex.lock();
        loop {
            if self.pending.swap(false, Ordering::SeqCst) {
                return true;
            }
            if self.condvar.wait_until(&mut guard, deadline).timed_out() {
                return self.pending.swap(false, Ordering::SeqCst);
            }
        }
    }
}
