use std::time::{Duration, Instant};

use framepulse_core::{CaptureConfig, CaptureScheduler, XcapCompositor};

/// 10-second live polling benchmark against the primary monitor: how many
/// genuinely new frames arrive, how much poll time is wasted on repeats.
fn main() -> anyhow::Result<()> {
    env_logger::init();

    println!("🔍 Framepulse Poll Benchmark");
    println!("============================");

    let config = CaptureConfig::from_env();
    let compositor = XcapCompositor::new(0, &config)?;
    println!(
        "Capture: {}x{} @ {} FPS target, {:?} mode",
        config.width, config.height, config.target_fps, config.mode
    );
    println!("   Duration: 10 seconds...");

    let scheduler = CaptureScheduler::spawn(config, Box::new(compositor))?;
    let handle = scheduler.handle();

    let start = Instant::now();
    let mut last_seen = handle.notifier.current();
    let mut last_dot = Instant::now();

    while start.elapsed() < Duration::from_secs(10) {
        if let Some(current) = handle
            .notifier
            .wait_for_change_timeout(last_seen, Duration::from_millis(250))
        {
            last_seen = current;
        }
        if last_dot.elapsed() > Duration::from_secs(1) {
            print!(".");
            use std::io::Write;
            let _ = std::io::stdout().flush();
            last_dot = Instant::now();
        }
    }

    let elapsed = start.elapsed();
    let snap = handle.stats.snapshot();
    scheduler.shutdown();

    let total_polls = snap.new_frames + snap.stale_polls + snap.snapshot_errors;
    println!("\n\n📊 Results:");
    println!("-----------");
    println!("New frames:     {}", snap.new_frames);
    println!("Stale polls:    {}", snap.stale_polls);
    println!("Poll errors:    {}", snap.snapshot_errors);
    println!(
        "Delivered FPS:  {:.2}",
        snap.new_frames as f64 / elapsed.as_secs_f64()
    );
    if total_polls > 0 {
        println!(
            "Stale share:    {:.1}%",
            100.0 * snap.stale_polls as f64 / total_polls as f64
        );
    }
    println!(
        "Wasted polling: {:.1}ms over {:.2}s",
        snap.wasted_poll_us as f64 / 1_000.0,
        elapsed.as_secs_f64()
    );

    Ok(())
}
