//! Runtime capture configuration
//!
//! All knobs are resolved once at startup and passed to the scheduler and
//! predictor as plain values. Environment variables (optionally from a
//! `.env` file) override the defaults:
//!
//! - `FRAMEPULSE_MODE`             — `inferred` (default) or `vsync`
//! - `FRAMEPULSE_TARGET_FPS`       — target source frame rate (default 60)
//! - `FRAMEPULSE_WIDTH` / `FRAMEPULSE_HEIGHT` — logical capture resolution
//! - `FRAMEPULSE_IDLE_SLEEP`       — `1`/`0`, long sleeps when display is idle
//! - `FRAMEPULSE_PREDICTIVE_SLEEP` — `1`/`0`, sleep until predicted arrival
//! - `FRAMEPULSE_EARLY_WAKE`       — `1`/`0`, sleep out the dead zone right
//!                                   after a new frame

use std::env;

/// How the capture thread learns about new frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// No refresh signal from the compositor: estimate the source frame
    /// interval statistically from observed arrival times.
    #[default]
    Inferred,
    /// The compositor delivers a per-refresh callback; the capture thread
    /// waits on it instead of predicting arrival times.
    EdgeNotified,
}

/// Capture settings, resolved once at startup.
#[derive(Clone, Copy, Debug)]
pub struct CaptureConfig {
    pub mode: CaptureMode,
    /// Nominal source frame rate the capture tries to keep up with.
    pub target_fps: u32,
    /// Logical capture resolution (the committed buffer size).
    pub width: u32,
    pub height: u32,
    /// Drop the poll rate sharply when the display has been static.
    pub idle_sleep: bool,
    /// Sleep until just before the predicted next arrival.
    pub predictive_sleep: bool,
    /// Sleep out the window right after a commit where no new frame can be
    /// due yet.
    pub early_wake: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            mode: CaptureMode::Inferred,
            target_fps: 60,
            width: 320,
            height: 240,
            idle_sleep: true,
            predictive_sleep: true,
            early_wake: true,
        }
    }
}

impl CaptureConfig {
    /// Nominal interval between source frames, in microseconds.
    #[must_use]
    pub fn target_interval_us(&self) -> u64 {
        1_000_000 / u64::from(self.target_fps.max(1))
    }

    /// Build a config from the environment, falling back to defaults for
    /// anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(mode) = env::var("FRAMEPULSE_MODE") {
            cfg.mode = match mode.to_lowercase().as_str() {
                "vsync" | "edge" => CaptureMode::EdgeNotified,
                _ => CaptureMode::Inferred,
            };
        }
        if let Some(fps) = env_u32("FRAMEPULSE_TARGET_FPS") {
            if fps > 0 {
                cfg.target_fps = fps;
            }
        }
        if let Some(w) = env_u32("FRAMEPULSE_WIDTH") {
            if w > 0 {
                cfg.width = w;
            }
        }
        if let Some(h) = env_u32("FRAMEPULSE_HEIGHT") {
            if h > 0 {
                cfg.height = h;
            }
        }
        if let Some(v) = env_bool("FRAMEPULSE_IDLE_SLEEP") {
            cfg.idle_sleep = v;
        }
        if let Some(v) = env_bool("FRAMEPULSE_PREDICTIVE_SLEEP") {
            cfg.predictive_sleep = v;
        }
        if let Some(v) = env_bool("FRAMEPULSE_EARLY_WAKE") {
            cfg.early_wake = v;
        }

        cfg
    }
}

fn env_u32(key: &str) -> Option<u32> {
    env::var(key).ok()?.trim().parse().ok()
}

fn env_bool(key: &str) -> Option<bool> {
    match env::var(key).ok()?.trim() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
