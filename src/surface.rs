//! Frame buffers and display geometry
//!
//! Two fixed-size RGB565 buffers exist for the whole process lifetime:
//! a *scratch* buffer written by each poll (owned by the capture thread)
//! and a *committed* buffer holding the last accepted frame, exposed
//! read-only to the consumer.

use parking_lot::RwLock;

/// A fixed-size RGB565 pixel buffer. Allocated once, never resized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u16>,
}

impl FrameBuffer {
    /// Allocate a zeroed buffer. A zeroed (black) start means the first
    /// non-black snapshot registers as a new frame.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0u16; width as usize * height as usize],
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u16] {
        &mut self.pixels
    }

    /// Copy another buffer's contents into this one. Sizes must match;
    /// buffers are never resized after startup.
    pub fn copy_from(&mut self, other: &Self) {
        debug_assert_eq!(self.pixels.len(), other.pixels.len());
        self.pixels.copy_from_slice(&other.pixels);
    }
}

/// Aspect-preserving fit of the native display into the logical capture
/// resolution, computed once at startup. Unused borders stay black.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayGeometry {
    pub native_width: u32,
    pub native_height: u32,
    /// Size of the scaled image inside the logical buffer.
    pub scaled_width: u32,
    pub scaled_height: u32,
    /// Centering offsets of the scaled image inside the logical buffer.
    pub x_offset: u32,
    pub y_offset: u32,
    pub scaling_factor: f64,
}

impl DisplayGeometry {
    /// Fit `native` into `out` without stretching, centering the result.
    #[must_use]
    pub fn fit(native_width: u32, native_height: u32, out_width: u32, out_height: u32) -> Self {
        let mut scaled_width = out_width;
        let mut scaled_height = out_height;
        let mut x_offset = 0;
        let mut y_offset = 0;
        let scaling_factor;

        if u64::from(out_width) * u64::from(native_height)
            < u64::from(out_height) * u64::from(native_width)
        {
            // Native is wider than the output: letterbox top and bottom.
            scaled_height =
                (f64::from(out_width) * f64::from(native_height) / f64::from(native_width) + 0.5)
                    as u32;
            scaling_factor = f64::from(out_width) / f64::from(native_width);
            y_offset = (out_height - scaled_height) / 2;
        } else {
            // Native is taller: pillarbox left and right.
            scaled_width =
                (f64::from(out_height) * f64::from(native_width) / f64::from(native_height) + 0.5)
                    as u32;
            scaling_factor = f64::from(out_height) / f64::from(native_height);
            x_offset = (out_width - scaled_width) / 2;
        }

        Self {
            native_width,
            native_height,
            scaled_width,
            scaled_height,
            x_offset,
            y_offset,
            scaling_factor,
        }
    }
}

/// The committed frame slot shared between the capture thread and the
/// consumer. There is exactly one slot: a consumer that skips a commit
/// only ever sees the latest frame.
///
/// The write lock is released before the notification counter becomes
/// visible, so a consumer woken by the notifier always reads a fully
/// committed frame.
pub struct FrameSurface {
    geometry: DisplayGeometry,
    committed: RwLock<FrameBuffer>,
}

impl FrameSurface {
    #[must_use]
    pub fn new(width: u32, height: u32, geometry: DisplayGeometry) -> Self {
        Self {
            geometry,
            committed: RwLock::new(FrameBuffer::new(width, height)),
        }
    }

    #[must_use]
    pub fn geometry(&self) -> DisplayGeometry {
        self.geometry
    }

    /// Read the committed buffer under a shared lock.
    pub fn with_committed<R>(&self, f: impl FnOnce(&FrameBuffer) -> R) -> R {
        f(&self.committed.read())
    }

    /// Replace the committed frame with the scratch buffer contents.
    /// Capture thread only.
    pub fn commit(&self, scratch: &FrameBuffer) {
        self.committed.write().copy_from(scratch);
    }
}
