//! Compositor snapshot capability
//!
//! The display compositor is a black box to the capture core: something
//! that can report its native geometry and copy the currently displayed
//! pixels into a caller-owned buffer. The trait seam keeps the scheduler
//! testable against a scripted frame source.
//!
//! The shipped backend uses `xcap` (X11/XCB, Wayland portal, DXGI,
//! `SCStreamOutput` depending on platform) and downscales into the logical
//! RGB565 buffer on the CPU.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use xcap::Monitor;

use crate::config::CaptureConfig;
use crate::notify::VsyncSignal;
use crate::surface::{DisplayGeometry, FrameBuffer};

/// Black-box snapshot capability.
///
/// Construction covers the fatal one-time setup (open the display, query
/// geometry, size the destination); per-snapshot failures are recoverable
/// and surface as `Err` from [`Compositor::snapshot_into`].
pub trait Compositor: Send {
    /// Geometry computed once at startup: native size, scale factor and
    /// centering offsets inside the logical buffer.
    fn geometry(&self) -> DisplayGeometry;

    /// Blocking snapshot of current on-screen contents into `dest`, scaled
    /// and centered per [`Compositor::geometry`]. Either fills the buffer
    /// completely or fails without touching the caller's committed state;
    /// there are no partial frames.
    fn snapshot_into(&mut self, dest: &mut FrameBuffer) -> Result<()>;

    /// Ask for a per-refresh callback onto `signal`. Returns false when the
    /// backend has no such notification (the common case).
    fn subscribe_vsync(&mut self, signal: Arc<VsyncSignal>) -> bool {
        let _ = signal;
        false
    }
}

/// xcap-backed compositor snapshot source.
pub struct XcapCompositor {
    monitor: Monitor,
    geometry: DisplayGeometry,
}

impl XcapCompositor {
    /// Open monitor `monitor_index` and fix the capture geometry for the
    /// process lifetime.
    ///
    /// # Errors
    /// Fails when no monitor exists at that index or its geometry cannot
    /// be queried; the caller cannot capture anything in that case.
    pub fn new(monitor_index: usize, config: &CaptureConfig) -> Result<Self> {
        let monitors =
            Monitor::all().map_err(|e| anyhow!("Failed to enumerate monitors: {e}"))?;
        let monitor = monitors
            .get(monitor_index)
            .ok_or_else(|| {
                anyhow!(
                    "Monitor index {} not found (available: {})",
                    monitor_index,
                    monitors.len()
                )
            })?
            .clone();

        let native_width = monitor
            .width()
            .map_err(|e| anyhow!("Failed to query monitor width: {e}"))?;
        let native_height = monitor
            .height()
            .map_err(|e| anyhow!("Failed to query monitor height: {e}"))?;
        if native_width == 0 || native_height == 0 {
            return Err(anyhow!(
                "Monitor reports degenerate size {native_width}x{native_height}"
            ));
        }

        let geometry =
            DisplayGeometry::fit(native_width, native_height, config.width, config.height);
        log::info!(
            "🖥️  Compositor display is {}x{}. Capture buffer is {}x{}. Applying scaling factor {:.2}x, xOffset: {}, yOffset: {}, scaledWidth: {}, scaledHeight: {}",
            native_width,
            native_height,
            config.width,
            config.height,
            geometry.scaling_factor,
            geometry.x_offset,
            geometry.y_offset,
            geometry.scaled_width,
            geometry.scaled_height
        );

        Ok(Self { monitor, geometry })
    }
}

impl Compositor for XcapCompositor {
    fn geometry(&self) -> DisplayGeometry {
        self.geometry
    }

    fn snapshot_into(&mut self, dest: &mut FrameBuffer) -> Result<()> {
        let image = self
            .monitor
            .capture_image()
            .map_err(|e| anyhow!("Snapshot failed: {e}"))?;

        let g = self.geometry;
        let expected = g.native_width as usize * g.native_height as usize * 4;
        let rgba = image.into_raw();
        if rgba.len() != expected {
            // Resolution changed under us; skip this poll.
            return Err(anyhow!(
                "Snapshot size {} does not match configured geometry ({} expected)",
                rgba.len(),
                expected
            ));
        }

        rgba_to_rgb565_scaled(&rgba, g, dest);
        Ok(())
    }
}

/// Nearest-neighbor downscale plus RGBA8888 -> RGB565 pack, writing the
/// scaled image centered into `dest`. Border pixels are never written and
/// stay black from the startup zero fill.
fn rgba_to_rgb565_scaled(rgba: &[u8], g: DisplayGeometry, dest: &mut FrameBuffer) {
    let src_w = g.native_width as usize;
    let dst_w = g.scaled_width as usize;
    let dst_h = g.scaled_height as usize;
    let out_w = dest.width() as usize;
    let x_off = g.x_offset as usize;
    let y_off = g.y_offset as usize;

    // 16.16 fixed-point source steps.
    let x_ratio = (src_w << 16) / dst_w;
    let y_ratio = ((g.native_height as usize) << 16) / dst_h;

    let pixels = dest.pixels_mut();
    for j in 0..dst_h {
        let src_y = (j * y_ratio) >> 16;
        let src_row = src_y * src_w;
        let dst_row = (j + y_off) * out_w + x_off;
        for i in 0..dst_w {
            let src_x = (i * x_ratio) >> 16;
            let idx = (src_row + src_x) * 4;

            let r = u16::from(rgba[idx]);
            let g_ = u16::from(rgba[idx + 1]);
            let b = u16::from(rgba[idx + 2]);
            pixels[dst_row + i] = ((r >> 3) << 11) | ((g_ >> 2) << 5) | (b >> 3);
        }
    }
}
