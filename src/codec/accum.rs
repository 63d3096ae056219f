//! Re-chunk arbitrary PCM pushes into fixed-size codec frames.
//!
//! Callers push sample blocks of any length; the codec only accepts
//! frames from the legal Opus set. The accumulator carries the samples
//! that do not yet fill a frame, so no sample is ever lost or
//! duplicated: pushed == emitted + carried.

use super::PadPolicy;

/// Single-owner carry buffer between caller chunking and codec framing.
///
/// `frame` is the full interleaved frame length, i.e. samples per
/// channel times channel count.
pub(crate) struct FrameAccumulator {
    carry: Vec<f32>,
    frame: usize,
}

impl FrameAccumulator {
    pub fn new(samples_per_channel: usize, channels: usize) -> Self {
        Self { carry: Vec::new(), frame: samples_per_channel * channels }
    }

    /// Appends samples to the carry. No framing happens here.
    pub fn push(&mut self, samples: &[f32]) {
        self.carry.extend_from_slice(samples);
    }

    /// Iterates over the complete frames currently available, removing
    /// them from the front of the carry. After the iterator is
    /// exhausted the carry holds fewer than one frame.
    pub fn drain_frames(&mut self) -> DrainFrames<'_> {
        DrainFrames { accum: self }
    }

    /// Emits the final partial frame on close.
    ///
    /// With [`PadPolicy::Silence`] the carry is zero-padded to one full
    /// frame; with [`PadPolicy::Drop`] it is discarded. Returns `None`
    /// when the carry is empty or dropped.
    pub fn drain_final(&mut self, policy: PadPolicy) -> Option<Vec<f32>> {
        debug_assert!(self.carry.len() < self.frame);
        if self.carry.is_empty() {
            return None;
        }
        match policy {
            PadPolicy::Silence => {
                let mut frame = std::mem::take(&mut self.carry);
                frame.resize(self.frame, 0.0);
                Some(frame)
            }
            PadPolicy::Drop => {
                self.carry.clear();
                None
            }
        }
    }

    /// Number of samples currently carried.
    pub fn carry_len(&self) -> usize {
        self.carry.len()
    }

    /// Full interleaved frame length.
    pub fn frame_len(&self) -> usize {
        self.frame
    }
}

/// Iterator returned by [`FrameAccumulator::drain_frames`].
pub(crate) struct DrainFrames<'a> {
    accum: &'a mut FrameAccumulator,
}

impl Iterator for DrainFrames<'_> {
    type Item = Vec<f32>;

    fn next(&mut self) -> Option<Vec<f32>> {
        if self.accum.carry.len() < self.accum.frame {
            return None;
        }
        Some(self.accum.carry.drain(..self.accum.frame).collect())
    }
}
