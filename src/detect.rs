//! New-frame detection
//!
//! The compositor offers no "contents changed" signal, so the only way to
//! tell a new frame from a repeated poll is to compare pixels. Comparison
//! is bit-exact: two distinct source frames that render identical pixels
//! are indistinguishable from a repeat, which is an accepted property of a
//! sampling capture, not a defect.

use crate::surface::FrameBuffer;

/// Pixels compared per step. Slice equality on a chunk compiles down to a
/// wide memcmp, and the early return keeps the common animated case O(1).
const COMPARE_CHUNK: usize = 64;

/// Returns true if the two buffers differ in any pixel. Scans from the
/// start and stops at the first differing chunk; the worst case (identical
/// buffers) reads both buffers fully.
#[must_use]
pub fn frames_differ(scratch: &FrameBuffer, committed: &FrameBuffer) -> bool {
    let a = scratch.pixels();
    let b = committed.pixels();
    debug_assert_eq!(a.len(), b.len());

    let mut a_chunks = a.chunks_exact(COMPARE_CHUNK);
    let mut b_chunks = b.chunks_exact(COMPARE_CHUNK);
    for (ca, cb) in a_chunks.by_ref().zip(b_chunks.by_ref()) {
        if ca != cb {
            return true;
        }
    }
    a_chunks.remainder() != b_chunks.remainder()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_with(width: u32, height: u32, fill: u16) -> FrameBuffer {
        let mut b = FrameBuffer::new(width, height);
        b.pixels_mut().fill(fill);
        b
    }

    #[test]
    fn test_identical_buffers_are_unchanged() {
        let a = buffer_with(320, 240, 0x1234);
        let b = buffer_with(320, 240, 0x1234);
        assert!(!frames_differ(&a, &b));
    }

    #[test]
    fn test_single_pixel_difference_is_detected_anywhere() {
        let base = buffer_with(320, 240, 0);
        let len = base.pixels().len();
        // First pixel, somewhere mid-buffer, inside the chunk remainder,
        // and the very last pixel.
        for idx in [0, len / 2, len - COMPARE_CHUNK / 2, len - 1] {
            let mut changed = base.clone();
            changed.pixels_mut()[idx] = 0xFFFF;
            assert!(frames_differ(&changed, &base), "pixel {idx} not detected");
        }
    }

    #[test]
    fn test_non_chunk_multiple_size_compares_tail() {
        // 33 pixels: one partial chunk past the 64-pixel stride would be
        // skipped if the remainder were not compared.
        let a = buffer_with(33, 1, 7);
        let mut b = buffer_with(33, 1, 7);
        assert!(!frames_differ(&a, &b));
        b.pixels_mut()[32] = 8;
        assert!(frames_differ(&a, &b));
    }
}
