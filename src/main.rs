use std::time::Duration;

use framepulse_core::{CaptureConfig, CaptureScheduler, XcapCompositor};

/// Run a capture against the primary monitor and act as a minimal consumer:
/// wait on the notification counter and report throughput. A real output
/// pipeline would read the committed buffer here instead.
fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = CaptureConfig::from_env();
    let monitor_index: usize = std::env::var("FRAMEPULSE_MONITOR")
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0);

    log::info!(
        "🚀 framepulse-core: monitor {}, {}x{} @ {} FPS target, {:?} mode",
        monitor_index,
        config.width,
        config.height,
        config.target_fps,
        config.mode
    );

    // Compositor setup failure means no capture is possible; report and die.
    let compositor = match XcapCompositor::new(monitor_index, &config) {
        Ok(c) => c,
        Err(e) => {
            log::error!("❌ Compositor setup failed: {e:#}");
            std::process::exit(1);
        }
    };

    let scheduler = CaptureScheduler::spawn(config, Box::new(compositor))?;
    let handle = scheduler.handle();

    let mut last_seen = handle.notifier.current();
    let mut last_report = std::time::Instant::now();
    let mut frames_since_report = 0u64;

    loop {
        match handle
            .notifier
            .wait_for_change_timeout(last_seen, Duration::from_secs(5))
        {
            Some(current) => {
                frames_since_report += current - last_seen;
                last_seen = current;
            }
            None => {
                log::info!("💤 No new frames for 5s (display idle)");
            }
        }

        if last_report.elapsed() >= Duration::from_secs(10) {
            let snap = handle.stats.snapshot();
            let fps = frames_since_report as f64 / last_report.elapsed().as_secs_f64();
            log::info!(
                "📊 {:.1} FPS delivered | total new: {} stale: {} errors: {} wasted: {}ms",
                fps,
                snap.new_frames,
                snap.stale_polls,
                snap.snapshot_errors,
                snap.wasted_poll_us / 1_000
            );
            frames_since_report = 0;
            last_report = std::time::Instant::now();
        }
    }
}
