//! Framepulse Core
//!
//! Low-latency frame acquisition from a GPU-composited display that offers
//! no "new frame ready" event. A background thread polls the compositor,
//! detects genuinely new frames by pixel comparison, predicts when the next
//! one is due to keep CPU and power cost down, and hands accepted frames to
//! a consumer thread through a single committed buffer plus a monotonic
//! notification counter.
//!
//! # Capture modes
//! - **Inferred** (default): source frame interval estimated from observed
//!   arrival times, predictive sleeps between polls.
//! - **Edge-notified**: compositor refresh callback wakes the poll loop;
//!   only usable with backends that deliver one.

pub mod clock;
pub mod compositor;
pub mod config;
pub mod detect;
pub mod notify;
pub mod predict;
pub mod scheduler;
pub mod stats;
pub mod surface;

pub use compositor::{Compositor, XcapCompositor};
pub use config::{CaptureConfig, CaptureMode};
pub use notify::{FrameNotifier, VsyncSignal};
pub use predict::{ArrivalHistory, ArrivalPredictor, EdgeNotifiedPredictor, InferredPredictor};
pub use scheduler::{CaptureHandle, CaptureScheduler};
pub use stats::{CaptureStats, StatsSnapshot};
pub use surface::{DisplayGeometry, FrameBuffer, FrameSurface};
