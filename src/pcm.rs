//! Planar PCM buffers.
//!
//! `PcmBuffer` is the data currency between the decoder, the resampler
//! and the streaming codec: `f32` samples in `[-1.0, 1.0]`, one `Vec`
//! per channel, with the sample rate attached at creation and immutable
//! afterwards.

use crate::error::{Error, Result};

/// A planar buffer of `f32` PCM samples with an attached sample rate.
///
/// All channels have the same length. Buffers handed out by streams and
/// decoders are independent copies; mutating them never touches any
/// internal codec state.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    data: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl PcmBuffer {
    /// Creates a buffer from per-channel sample vectors.
    ///
    /// Fails if there are no channels, the channels have unequal
    /// lengths, or the rate is zero.
    pub fn new(data: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::InvalidRate(sample_rate));
        }
        if data.is_empty() {
            return Err(Error::BadChannels(0));
        }
        let frames = data[0].len();
        if data.iter().any(|c| c.len() != frames) {
            return Err(Error::RaggedPcm {
                samples: data.iter().map(|c| c.len()).sum(),
                channels: data.len(),
            });
        }
        Ok(Self { data, sample_rate })
    }

    /// Creates a single-channel buffer.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        Self::new(vec![samples], sample_rate)
    }

    /// Creates a buffer from interleaved samples.
    pub fn from_interleaved(samples: &[f32], channels: usize, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(Error::BadChannels(0));
        }
        if samples.len() % channels != 0 {
            return Err(Error::RaggedPcm { samples: samples.len(), channels });
        }
        let frames = samples.len() / channels;
        let mut data = vec![Vec::with_capacity(frames); channels];
        for frame in samples.chunks_exact(channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                data[ch].push(sample);
            }
        }
        Self::new(data, sample_rate)
    }

    /// Returns the sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the number of channels.
    pub fn channels(&self) -> usize {
        self.data.len()
    }

    /// Returns the number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.data[0].len()
    }

    /// Returns the duration in seconds.
    pub fn duration_sec(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Returns the samples of one channel.
    ///
    /// # Panics
    /// Panics if `channel >= self.channels()`.
    pub fn channel(&self, channel: usize) -> &[f32] {
        &self.data[channel]
    }

    /// Returns all channels.
    pub fn channel_data(&self) -> &[Vec<f32>] {
        &self.data
    }

    /// Consumes the buffer, returning the per-channel vectors.
    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.data
    }

    /// Returns the samples interleaved by channel.
    pub fn interleaved(&self) -> Vec<f32> {
        let channels = self.channels();
        if channels == 1 {
            return self.data[0].clone();
        }
        let mut out = Vec::with_capacity(self.frames() * channels);
        for frame in 0..self.frames() {
            for ch in &self.data {
                out.push(ch[frame]);
            }
        }
        out
    }

    /// Appends the frames of `other` to this buffer.
    ///
    /// Both buffers must agree on channel count and sample rate; rate
    /// conversion is explicit via [`crate::resample::resample_buffer`].
    pub fn extend(&mut self, other: &PcmBuffer) -> Result<()> {
        if other.channels() != self.channels() {
            return Err(Error::ChannelMismatch {
                expected: self.channels(),
                actual: other.channels(),
            });
        }
        if other.sample_rate != self.sample_rate {
            return Err(Error::RateMismatch {
                expected: self.sample_rate,
                actual: other.sample_rate,
            });
        }
        for (dst, src) in self.data.iter_mut().zip(&other.data) {
            dst.extend_from_slice(src);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_bad_shapes() {
        assert!(matches!(
            PcmBuffer::new(vec![], 48000),
            Err(Error::BadChannels(0))
        ));
        assert!(matches!(
            PcmBuffer::new(vec![vec![0.0; 3], vec![0.0; 4]], 48000),
            Err(Error::RaggedPcm { .. })
        ));
        assert!(matches!(
            PcmBuffer::new(vec![vec![0.0; 3]], 0),
            Err(Error::InvalidRate(0))
        ));
    }

    #[test]
    fn test_interleave_roundtrip() {
        let buf = PcmBuffer::new(vec![vec![1.0, 2.0, 3.0], vec![-1.0, -2.0, -3.0]], 48000).unwrap();
        let inter = buf.interleaved();
        assert_eq!(inter, vec![1.0, -1.0, 2.0, -2.0, 3.0, -3.0]);

        let back = PcmBuffer::from_interleaved(&inter, 2, 48000).unwrap();
        assert_eq!(back, buf);
    }

    #[test]
    fn test_from_interleaved_ragged() {
        let result = PcmBuffer::from_interleaved(&[0.0; 5], 2, 48000);
        assert!(matches!(result, Err(Error::RaggedPcm { .. })));
    }

    #[test]
    fn test_duration() {
        let buf = PcmBuffer::mono(vec![0.0; 24000], 48000).unwrap();
        assert!((buf.duration_sec() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_extend() {
        let mut a = PcmBuffer::mono(vec![1.0, 2.0], 16000).unwrap();
        let b = PcmBuffer::mono(vec![3.0], 16000).unwrap();
        a.extend(&b).unwrap();
        assert_eq!(a.channel(0), &[1.0, 2.0, 3.0]);

        let stereo = PcmBuffer::new(vec![vec![0.0], vec![0.0]], 16000).unwrap();
        assert!(matches!(a.extend(&stereo), Err(Error::ChannelMismatch { .. })));

        let other_rate = PcmBuffer::mono(vec![0.0], 48000).unwrap();
        assert!(matches!(a.extend(&other_rate), Err(Error::RateMismatch { .. })));
    }

    #[test]
    fn test_empty_frames() {
        let buf = PcmBuffer::mono(vec![], 48000).unwrap();
        assert_eq!(buf.frames(), 0);
        assert!(buf.interleaved().is_empty());
    }
}
