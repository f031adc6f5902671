//! CLOCK victim selection (spec §4.B). Grounded in the teacher's
//! `LRUKReplacer`: a standalone struct decoupled from frame storage,
//! indexed purely by [`FrameId`], with its own persistent cursor rather
//! than LRU-K's per-frame access history.

use super::frame::{FrameDescriptor, FrameId};

/// A circular sweep over the frame array with a one-shot-per-pass
/// reference-bit clear. The cursor persists across calls — the scan bound
/// of `2 * N` in [`ClockReplacer::pick_victim`] depends on it never being
/// reset mid-lifetime.
#[derive(Debug)]
pub struct ClockReplacer {
    num_frames: usize,
    cursor: usize,
}

impl ClockReplacer {
    pub fn new(num_frames: usize) -> Self {
        ClockReplacer {
            num_frames,
            cursor: 0,
        }
    }

    fn advance(&mut self) {
        if self.num_frames > 0 {
            self.cursor = (self.cursor + 1) % self.num_frames;
        }
    }

    /// Scans at most `2 * num_frames` frames starting at the cursor,
    /// clearing reference bits of unpinned-but-referenced frames along the
    /// way. Returns the index of an evictable frame, or `None` if every
    /// frame is pinned.
    pub fn pick_victim(&mut self, frames: &mut [FrameDescriptor]) -> Option<FrameId> {
        if self.num_frames == 0 {
            return None;
        }
        debug_assert_eq!(frames.len(), self.num_frames);

        for _ in 0..2 * self.num_frames {
            let idx = self.cursor;
            let frame = &mut frames[idx];

            if !frame.is_valid() {
                return Some(idx);
            }

            if frame.pin_count() == 0 {
                if frame.reference() {
                    frame.set_reference(false);
                    self.advance();
                    continue;
                }
                return Some(idx);
            }

            self.advance();
        }

        None
    }
}
