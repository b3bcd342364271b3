//! Capture scheduler
//!
//! Owns the capture thread and its sleep -> snapshot -> diff -> commit ->
//! notify cycle. One cycle is a single pass of the state machine
//! (`run_cycle`), the thread just repeats it while the running flag holds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Result;

use crate::clock;
use crate::compositor::Compositor;
use crate::config::{CaptureConfig, CaptureMode};
use crate::detect;
use crate::notify::{FrameNotifier, VsyncSignal};
use crate::predict::{ArrivalPredictor, EdgeNotifiedPredictor, InferredPredictor};
use crate::stats::CaptureStats;
use crate::surface::{FrameBuffer, FrameSurface};

/// Wake this much before the nominal next-frame time in the early-wake
/// sleep, so the poll lands just ahead of the expected arrival.
const EARLY_WAKE_MARGIN_US: u64 = 500;

/// Don't bother sleeping when the predicted arrival is closer than this;
/// scheduler wakeup jitter would eat the whole sleep.
const MIN_SLEEP_US: u64 = 2_500;

/// New frames between FPS reports.
const FPS_REPORT_INTERVAL: u64 = 300;

/// What a single capture cycle did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CycleOutcome {
    NewFrame,
    Stale,
    SnapshotError,
}

/// Consumer-side view of a running capture: the committed frame slot, the
/// new-frame counter to wait on, and the observability counters.
#[derive(Clone)]
pub struct CaptureHandle {
    pub surface: Arc<FrameSurface>,
    pub notifier: Arc<FrameNotifier>,
    pub stats: Arc<CaptureStats>,
}

/// Everything the capture thread touches, gathered in one owned context.
/// No globals: the thread owns this exclusively for the process lifetime.
struct CaptureLoop {
    config: CaptureConfig,
    compositor: Box<dyn Compositor>,
    predictor: Box<dyn ArrivalPredictor>,
    /// Present only when edge-notified mode is active and the backend
    /// actually delivers refresh callbacks.
    vsync: Option<Arc<VsyncSignal>>,
    scratch: FrameBuffer,
    surface: Arc<FrameSurface>,
    notifier: Arc<FrameNotifier>,
    stats: Arc<CaptureStats>,
    last_new_frame_us: u64,
    frames_captured: u64,
    started_us: u64,
}

impl CaptureLoop {
    fn new(config: CaptureConfig, mut compositor: Box<dyn Compositor>) -> Self {
        let target_interval = config.target_interval_us();

        let mut vsync = None;
        let predictor: Box<dyn ArrivalPredictor> = match config.mode {
            CaptureMode::EdgeNotified => {
                let signal = Arc::new(VsyncSignal::new());
                if compositor.subscribe_vsync(Arc::clone(&signal)) {
                    vsync = Some(signal);
                    Box::new(EdgeNotifiedPredictor::new(target_interval))
                } else {
                    log::warn!(
                        "⚠️  Compositor has no refresh callback, falling back to inferred arrivals"
                    );
                    Box::new(InferredPredictor::new(target_interval, config.idle_sleep))
                }
            }
            CaptureMode::Inferred => {
                Box::new(InferredPredictor::new(target_interval, config.idle_sleep))
            }
        };

        let surface = Arc::new(FrameSurface::new(
            config.width,
            config.height,
            compositor.geometry(),
        ));
        let now = clock::monotonic_us();

        Self {
            scratch: FrameBuffer::new(config.width, config.height),
            config,
            compositor,
            predictor,
            vsync,
            surface,
            notifier: Arc::new(FrameNotifier::new()),
            stats: Arc::new(CaptureStats::new()),
            last_new_frame_us: now,
            frames_captured: 0,
            started_us: now,
        }
    }

    fn handle(&self) -> CaptureHandle {
        CaptureHandle {
            surface: Arc::clone(&self.surface),
            notifier: Arc::clone(&self.notifier),
            stats: Arc::clone(&self.stats),
        }
    }

    /// One pass of the capture state machine. Sleeps are best-effort; the
    /// cycle re-reads the clock after every one instead of trusting them.
    fn run_cycle(&mut self) -> CycleOutcome {
        let target_interval = self.config.target_interval_us();

        // 1. Early wake: no new frame can be due until roughly one target
        //    interval after the last one, so sleep out that dead zone.
        if self.config.early_wake {
            let earliest_next =
                (self.last_new_frame_us + target_interval).saturating_sub(EARLY_WAKE_MARGIN_US);
            let now = clock::monotonic_us();
            if now < earliest_next {
                std::thread::sleep(Duration::from_micros(earliest_next - now));
            }
        }

        // 2. Predictive wait: either block on the compositor's refresh
        //    signal, or sleep until just before the predicted arrival.
        if let Some(signal) = &self.vsync {
            signal.wait_and_clear(Duration::from_micros(2 * target_interval));
        } else if self.config.predictive_sleep || self.config.idle_sleep {
            let now = clock::monotonic_us();
            let next_arrival = self.predictor.predict_next_arrival_us(now);
            let time_to_sleep = next_arrival.saturating_sub(clock::monotonic_us());
            if time_to_sleep > MIN_SLEEP_US {
                std::thread::sleep(Duration::from_micros(time_to_sleep - MIN_SLEEP_US));
            }
        }

        // 3. Snapshot into scratch. Takes ~1ms and cannot be cancelled.
        let poll_start_us = clock::monotonic_us();
        self.predictor.record_poll(poll_start_us);
        if let Err(e) = self.compositor.snapshot_into(&mut self.scratch) {
            self.stats.record_snapshot_error();
            log::warn!("⚠️  Snapshot failed, skipping this poll: {e:#}");
            // Back off one nominal interval so a persistent fault does not
            // spin the loop.
            std::thread::sleep(Duration::from_micros(target_interval));
            return CycleOutcome::SnapshotError;
        }

        // 4. Only pixel contents can tell a new frame from a repeat.
        let changed = self
            .surface
            .with_committed(|committed| detect::frames_differ(&self.scratch, committed));
        let poll_end_us = clock::monotonic_us();

        // 5. Repeat frame: count the wasted time and try again.
        if !changed {
            self.stats.record_stale_poll(poll_end_us - poll_start_us);
            return CycleOutcome::Stale;
        }

        // 6. New frame: publish it, then make the counter move. The commit
        //    fully completes (write lock released) before the notifier
        //    increments, so a woken consumer always reads this frame or a
        //    newer one.
        self.surface.commit(&self.scratch);
        self.last_new_frame_us = poll_start_us;
        self.predictor.on_arrival(poll_start_us);
        self.stats.record_new_frame();
        self.notifier.notify();

        self.frames_captured += 1;
        if self.frames_captured % FPS_REPORT_INTERVAL == 0 {
            let elapsed_s = (poll_end_us - self.started_us) as f64 / 1_000_000.0;
            log::info!(
                "📹 Capture: {} frames, {:.1} FPS avg",
                self.frames_captured,
                self.frames_captured as f64 / elapsed_s.max(1e-6)
            );
        }
        CycleOutcome::NewFrame
    }
}

/// Background capture thread handle. Dropping it stops the thread;
/// [`CaptureScheduler::shutdown`] stops and joins it.
pub struct CaptureScheduler {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    handle: CaptureHandle,
}

impl CaptureScheduler {
    /// Start the capture loop on its own thread.
    ///
    /// # Errors
    /// Fails only if the OS refuses to spawn the thread; compositor setup
    /// errors have already surfaced from the backend constructor.
    pub fn spawn(config: CaptureConfig, compositor: Box<dyn Compositor>) -> Result<Self> {
        let mut capture = CaptureLoop::new(config, compositor);
        let handle = capture.handle();

        let running = Arc::new(AtomicBool::new(true));
        let running_clone = Arc::clone(&running);

        let thread = std::thread::Builder::new()
            .name("framepulse-capture".into())
            .spawn(move || {
                log::info!("✅ Capture loop started ({:?} mode)", config.mode);
                while running_clone.load(Ordering::Relaxed) {
                    capture.run_cycle();
                }
                log::info!("📹 Capture loop stopped");
            })?;

        Ok(Self {
            running,
            thread: Some(thread),
            handle,
        })
    }

    /// Consumer-side view of this capture.
    #[must_use]
    pub fn handle(&self) -> CaptureHandle {
        self.handle.clone()
    }

    /// Stop at the next loop boundary and join the capture thread.
    pub fn shutdown(mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for CaptureScheduler {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        // Not joining here: the thread may be mid-sleep and Drop must not
        // block; it exits at its next loop boundary.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::DisplayGeometry;
    use anyhow::anyhow;
    use parking_lot::Mutex;

    const W: u32 = 8;
    const H: u32 = 8;

    /// Compositor fed from a fixed list of frames; the last frame repeats
    /// once the script runs out. `None` entries simulate snapshot failure.
    struct ScriptedCompositor {
        frames: Vec<Option<Vec<u16>>>,
        cursor: usize,
        vsync_capable: bool,
        subscribed: Arc<Mutex<Option<Arc<VsyncSignal>>>>,
    }

    impl ScriptedCompositor {
        fn new(frames: Vec<Option<Vec<u16>>>) -> Self {
            Self {
                frames,
                cursor: 0,
                vsync_capable: false,
                subscribed: Arc::new(Mutex::new(None)),
            }
        }
    }

    impl Compositor for ScriptedCompositor {
        fn geometry(&self) -> DisplayGeometry {
            DisplayGeometry::fit(W, H, W, H)
        }

        fn snapshot_into(&mut self, dest: &mut FrameBuffer) -> Result<()> {
            let i = self.cursor.min(self.frames.len() - 1);
            self.cursor += 1;
            match &self.frames[i] {
                Some(pixels) => {
                    dest.pixels_mut().copy_from_slice(pixels);
                    Ok(())
                }
                None => Err(anyhow!("scripted snapshot failure")),
            }
        }

        fn subscribe_vsync(&mut self, signal: Arc<VsyncSignal>) -> bool {
            if self.vsync_capable {
                *self.subscribed.lock() = Some(signal);
            }
            self.vsync_capable
        }
    }

    fn frame(fill: u16) -> Vec<u16> {
        vec![fill; (W * H) as usize]
    }

    fn quiet_config() -> CaptureConfig {
        CaptureConfig {
            width: W,
            height: H,
            early_wake: false,
            predictive_sleep: false,
            idle_sleep: false,
            target_fps: 1_000, // keep the error-backoff sleep negligible
            ..Default::default()
        }
    }

    fn scripted_loop(frames: Vec<Option<Vec<u16>>>, config: CaptureConfig) -> CaptureLoop {
        CaptureLoop::new(config, Box::new(ScriptedCompositor::new(frames)))
    }

    #[test]
    fn test_repeated_polls_notify_only_on_transitions() {
        // Polls observe A, A, B, B, C with A already committed: exactly two
        // new frames (A->B and B->C), none on the repeats.
        let a = frame(1);
        let b = frame(2);
        let c = frame(3);
        let mut capture = scripted_loop(
            vec![
                Some(a.clone()),
                Some(a.clone()),
                Some(b.clone()),
                Some(b.clone()),
                Some(c.clone()),
            ],
            quiet_config(),
        );
        let handle = capture.handle();

        let mut seed = FrameBuffer::new(W, H);
        seed.pixels_mut().copy_from_slice(&a);
        handle.surface.commit(&seed);

        assert_eq!(capture.run_cycle(), CycleOutcome::Stale);
        assert_eq!(capture.run_cycle(), CycleOutcome::Stale);
        assert_eq!(handle.notifier.current(), 0);

        assert_eq!(capture.run_cycle(), CycleOutcome::NewFrame);
        assert_eq!(handle.notifier.current(), 1);
        handle.surface.with_committed(|f| assert_eq!(f.pixels(), &b[..]));

        assert_eq!(capture.run_cycle(), CycleOutcome::Stale);
        assert_eq!(handle.notifier.current(), 1);

        assert_eq!(capture.run_cycle(), CycleOutcome::NewFrame);
        assert_eq!(handle.notifier.current(), 2);
        handle.surface.with_committed(|f| assert_eq!(f.pixels(), &c[..]));

        let snap = handle.stats.snapshot();
        assert_eq!(snap.new_frames, 2);
        assert_eq!(snap.stale_polls, 3);
    }

    #[test]
    fn test_slow_consumer_sees_only_latest_commit() {
        let mut capture = scripted_loop(
            vec![Some(frame(1)), Some(frame(2)), Some(frame(3))],
            quiet_config(),
        );
        let handle = capture.handle();

        // Three commits, zero reads in between.
        for _ in 0..3 {
            assert_eq!(capture.run_cycle(), CycleOutcome::NewFrame);
        }
        assert_eq!(handle.notifier.current(), 3);
        handle
            .surface
            .with_committed(|f| assert_eq!(f.pixels(), &frame(3)[..]));
    }

    #[test]
    fn test_snapshot_failure_is_skipped_and_counted() {
        let mut capture = scripted_loop(
            vec![Some(frame(1)), None, Some(frame(2))],
            quiet_config(),
        );
        let handle = capture.handle();

        assert_eq!(capture.run_cycle(), CycleOutcome::NewFrame);
        handle
            .surface
            .with_committed(|f| assert_eq!(f.pixels(), &frame(1)[..]));

        // The failed poll must not corrupt the committed frame or notify.
        assert_eq!(capture.run_cycle(), CycleOutcome::SnapshotError);
        assert_eq!(handle.notifier.current(), 1);
        handle
            .surface
            .with_committed(|f| assert_eq!(f.pixels(), &frame(1)[..]));
        assert_eq!(handle.stats.snapshot().snapshot_errors, 1);

        assert_eq!(capture.run_cycle(), CycleOutcome::NewFrame);
        assert_eq!(handle.notifier.current(), 2);
    }

    #[test]
    fn test_edge_mode_subscribes_when_backend_supports_it() {
        let mut compositor = ScriptedCompositor::new(vec![Some(frame(1))]);
        compositor.vsync_capable = true;
        let subscribed = Arc::clone(&compositor.subscribed);

        let config = CaptureConfig {
            mode: CaptureMode::EdgeNotified,
            ..quiet_config()
        };
        let mut capture = CaptureLoop::new(config, Box::new(compositor));
        assert!(capture.vsync.is_some());

        // Signal a refresh so the cycle does not wait out the timeout.
        subscribed.lock().as_ref().unwrap().signal();
        assert_eq!(capture.run_cycle(), CycleOutcome::NewFrame);
    }

    #[test]
    fn test_edge_mode_falls_back_without_backend_support() {
        let config = CaptureConfig {
            mode: CaptureMode::EdgeNotified,
            ..quiet_config()
        };
        let capture = scripted_loop(vec![Some(frame(1))], config);
        assert!(capture.vsync.is_none());
    }

    #[test]
    fn test_scheduler_thread_stops_on_shutdown() {
        let scheduler = CaptureScheduler::spawn(
            quiet_config(),
            Box::new(ScriptedCompositor::new(vec![Some(frame(1))])),
        )
        .unwrap();
        let handle = scheduler.handle();

        // The first poll commits the frame; wait for the notification.
        assert!(handle
            .notifier
            .wait_for_change_timeout(0, Duration::from_secs(5))
            .is_some());

        scheduler.shutdown();
    }

    #[test]
    fn test_consumer_wakes_on_commit_from_capture_thread() {
        let scheduler = CaptureScheduler::spawn(
            quiet_config(),
            Box::new(ScriptedCompositor::new(vec![Some(frame(7))])),
        )
        .unwrap();
        let handle = scheduler.handle();

        let seen = handle.notifier.wait_for_change_timeout(0, Duration::from_secs(5));
        assert!(seen.is_some());
        handle
            .surface
            .with_committed(|f| assert_eq!(f.pixels()[0], 0x0007));

        scheduler.shutdown();
    }
}
