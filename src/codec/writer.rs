//! Streaming Opus encoder.

use tracing::debug;

use super::accum::FrameAccumulator;
use super::ogg::PageWriter;
use super::{opus_channels, validate_rate, FrameSize, PadPolicy, StreamState, OGG_SERIAL};
use crate::error::{Error, Result};

/// Maximum encoded Opus packet size in bytes.
const MAX_PACKET: usize = 4000;

/// Incremental Opus encoder producing a self-delimiting Ogg byte
/// stream.
///
/// PCM may be appended in blocks of any length; complete frames are
/// encoded as they become available and the resulting pages queue up
/// until pulled with [`read_bytes`](Self::read_bytes). The queue is
/// unbounded: callers wanting bounded memory must pull promptly.
///
/// The writer is single-owner and never blocks; share it across threads
/// only behind external mutual exclusion.
pub struct OpusStreamWriter {
    encoder: opus::Encoder,
    accum: FrameAccumulator,
    pages: PageWriter,
    out: Vec<u8>,
    state: StreamState,
    sample_rate: u32,
    channels: usize,
    frame_size: FrameSize,
    pad_policy: PadPolicy,
}

impl OpusStreamWriter {
    /// Creates a writer encoding at `sample_rate` Hz.
    ///
    /// The rate must be one Opus supports natively and `channels` must
    /// be 1 or 2. Defaults: 960-sample frames, silence padding on
    /// close. The Ogg header pages are queued immediately.
    pub fn new(sample_rate: u32, channels: usize) -> Result<Self> {
        validate_rate(sample_rate)?;
        let encoder =
            opus::Encoder::new(sample_rate, opus_channels(channels)?, opus::Application::Audio)?;

        let frame_size = FrameSize::default();
        let mut pages = PageWriter::new(OGG_SERIAL);
        let out = pages.head_pages(sample_rate, channels as u8);

        Ok(Self {
            encoder,
            accum: FrameAccumulator::new(frame_size.samples(), channels),
            pages,
            out,
            state: StreamState::Open,
            sample_rate,
            channels,
            frame_size,
            pad_policy: PadPolicy::Silence,
        })
    }

    /// Sets the frame size, checking it is a legal Opus frame duration
    /// at the configured sample rate.
    ///
    /// Must be called before any PCM is appended.
    pub fn frame_size(mut self, frame_size: FrameSize) -> Result<Self> {
        if !frame_size.legal_at(self.sample_rate) {
            return Err(Error::BadFrameSize {
                samples: frame_size.samples(),
                sample_rate: self.sample_rate,
            });
        }
        self.frame_size = frame_size;
        self.accum = FrameAccumulator::new(frame_size.samples(), self.channels);
        Ok(self)
    }

    /// Sets the policy for the final partial frame on close.
    pub fn pad_policy(mut self, policy: PadPolicy) -> Self {
        self.pad_policy = policy;
        self
    }

    /// Returns the sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the number of channels.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Appends interleaved PCM and encodes every complete frame.
    ///
    /// Fails with [`Error::Closed`] after [`close`](Self::close) and
    /// with [`Error::RaggedPcm`] when the sample count is not a
    /// multiple of the channel count; a rejected call leaves the stream
    /// state untouched.
    pub fn append_pcm(&mut self, pcm: &[f32]) -> Result<()> {
        if self.state != StreamState::Open {
            return Err(Error::Closed);
        }
        if pcm.len() % self.channels != 0 {
            return Err(Error::RaggedPcm { samples: pcm.len(), channels: self.channels });
        }
        self.accum.push(pcm);
        self.encode_ready()
    }

    /// Drains the queued Ogg bytes. Returns an empty vector when
    /// nothing is queued; never blocks.
    pub fn read_bytes(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out)
    }

    /// Appends PCM and immediately returns the bytes it produced.
    ///
    /// Equivalent to [`append_pcm`](Self::append_pcm) followed by
    /// [`read_bytes`](Self::read_bytes) on the same queue.
    pub fn encode(&mut self, pcm: &[f32]) -> Result<Vec<u8>> {
        self.append_pcm(pcm)?;
        Ok(self.read_bytes())
    }

    /// Flushes the final partial frame per the pad policy, writes the
    /// end-of-stream page, and closes the stream.
    ///
    /// Idempotent. After closing, `append_pcm` fails while `read_bytes`
    /// keeps draining what is queued.
    pub fn close(&mut self) -> Result<()> {
        if self.state == StreamState::Closed {
            return Ok(());
        }
        if let Some(frame) = self.accum.drain_final(self.pad_policy) {
            self.encode_frame(&frame)?;
        }
        let page = self.pages.eos_page();
        self.out.extend_from_slice(&page);
        self.state = StreamState::Closed;
        debug!(sample_rate = self.sample_rate, "opus stream writer closed");
        Ok(())
    }

    fn encode_ready(&mut self) -> Result<()> {
        while let Some(frame) = self.accum.drain_frames().next() {
            self.encode_frame(&frame)?;
        }
        Ok(())
    }

    fn encode_frame(&mut self, frame: &[f32]) -> Result<()> {
        let packet = self.encoder.encode_vec_float(frame, MAX_PACKET)?;
        let granule_delta = self.frame_size.samples() as u64 * 48_000 / self.sample_rate as u64;
        let page = self.pages.audio_page(&packet, granule_delta);
        self.out.extend_from_slice(&page);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_configuration() {
        assert!(matches!(
            OpusStreamWriter::new(44100, 1),
            Err(Error::UnsupportedRate(44100))
        ));
        assert!(matches!(
            OpusStreamWriter::new(48000, 3),
            Err(Error::BadChannels(3))
        ));
        // 2880 samples at 24 kHz would be a 120 ms frame.
        assert!(matches!(
            OpusStreamWriter::new(24000, 1).unwrap().frame_size(FrameSize::F2880),
            Err(Error::BadFrameSize { .. })
        ));
    }

    #[test]
    fn test_headers_queued_up_front() {
        let mut writer = OpusStreamWriter::new(48000, 1).unwrap();
        let bytes = writer.read_bytes();
        assert_eq!(&bytes[..4], b"OggS");
        // Nothing more until PCM arrives.
        assert!(writer.read_bytes().is_empty());
    }

    #[test]
    fn test_partial_frame_produces_no_packet() {
        let mut writer = OpusStreamWriter::new(48000, 1).unwrap();
        let _ = writer.read_bytes();
        writer.append_pcm(&vec![0.0; 959]).unwrap();
        assert!(writer.read_bytes().is_empty());
        writer.append_pcm(&[0.0]).unwrap();
        assert!(!writer.read_bytes().is_empty());
    }

    #[test]
    fn test_ragged_pcm_rejected_without_corruption() {
        let mut writer = OpusStreamWriter::new(48000, 2).unwrap();
        let _ = writer.read_bytes();
        assert!(matches!(
            writer.append_pcm(&vec![0.0; 961]),
            Err(Error::RaggedPcm { .. })
        ));
        // The stream still works after the rejected call.
        writer.append_pcm(&vec![0.0; 960 * 2]).unwrap();
        assert!(!writer.read_bytes().is_empty());
    }

    #[test]
    fn test_append_after_close_fails() {
        let mut writer = OpusStreamWriter::new(48000, 1).unwrap();
        writer.close().unwrap();
        assert!(matches!(writer.append_pcm(&[0.0; 960]), Err(Error::Closed)));
        // Close is idempotent; read_bytes drains then stays empty.
        writer.close().unwrap();
        assert!(!writer.read_bytes().is_empty());
        assert!(writer.read_bytes().is_empty());
    }

    #[test]
    fn test_encode_sugar_matches_queue() {
        let mut writer = OpusStreamWriter::new(48000, 1).unwrap();
        let _ = writer.read_bytes();
        let bytes = writer.encode(&vec![0.0; 960]).unwrap();
        assert!(!bytes.is_empty());
        // The sugar drained the queue.
        assert!(writer.read_bytes().is_empty());
    }

    #[test]
    fn test_non_default_frame_size() {
        let mut writer = OpusStreamWriter::new(16000, 1)
            .unwrap()
            .frame_size(FrameSize::F960)
            .unwrap(); // 60 ms at 16 kHz
        let _ = writer.read_bytes();
        writer.append_pcm(&vec![0.0; 960]).unwrap();
        assert!(!writer.read_bytes().is_empty());
    }
}
