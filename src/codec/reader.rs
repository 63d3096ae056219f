//! Streaming Opus decoder.

use tracing::{debug, warn};

use super::ogg::{Demuxer, OpusHead};
use super::{opus_channels, validate_rate, StreamState};
use crate::error::{Error, Result};

/// Incremental Opus decoder for an Ogg byte stream.
///
/// Bytes may be appended in blocks of any length and at any packet or
/// page boundary; complete packets are decoded as soon as they are
/// fully buffered and the PCM queues up until pulled with
/// [`read_pcm`](Self::read_pcm).
///
/// A single undecodable packet inside well-formed framing is skipped
/// with a warning; losing the Ogg framing itself is fatal to the
/// stream. Like the writer, the reader is single-owner and never
/// blocks.
pub struct OpusStreamReader {
    decoder: opus::Decoder,
    demux: Demuxer,
    pcm: Vec<f32>,
    state: StreamState,
    sample_rate: u32,
    channels: usize,
}

impl OpusStreamReader {
    /// Creates a reader decoding at `sample_rate` Hz.
    ///
    /// The rate must be one Opus supports natively and `channels` must
    /// be 1 or 2; the in-band OpusHead is checked against them.
    pub fn new(sample_rate: u32, channels: usize) -> Result<Self> {
        validate_rate(sample_rate)?;
        let decoder = opus::Decoder::new(sample_rate, opus_channels(channels)?)?;
        Ok(Self {
            decoder,
            demux: Demuxer::new(),
            pcm: Vec::new(),
            state: StreamState::Open,
            sample_rate,
            channels,
        })
    }

    /// Returns the sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the number of channels.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Appends raw stream bytes and decodes every packet that is now
    /// complete.
    ///
    /// Fails with [`Error::Closed`] after [`close`](Self::close) and
    /// with [`Error::Desync`] when the Ogg framing is lost, after which
    /// the stream is dead.
    pub fn append_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.state != StreamState::Open {
            return Err(Error::Closed);
        }
        self.demux.push(bytes);
        self.decode_ready()
    }

    /// Pulls the decoded PCM queued so far, interleaved by channel.
    ///
    /// Returns `Some` with an empty vector when no data is ready yet
    /// and `None` once the stream is closed and fully drained, so pull
    /// loops terminate deterministically.
    pub fn read_pcm(&mut self) -> Option<Vec<f32>> {
        if !self.pcm.is_empty() {
            return Some(std::mem::take(&mut self.pcm));
        }
        match self.state {
            StreamState::Open => Some(Vec::new()),
            StreamState::Closed => None,
        }
    }

    /// Appends bytes and immediately returns the PCM they produced.
    ///
    /// Equivalent to [`append_bytes`](Self::append_bytes) followed by
    /// [`read_pcm`](Self::read_pcm) on the same queue.
    pub fn decode(&mut self, bytes: &[u8]) -> Result<Vec<f32>> {
        self.append_bytes(bytes)?;
        Ok(std::mem::take(&mut self.pcm))
    }

    /// Closes the input side of the stream.
    ///
    /// One-way: no further bytes are accepted. Packets already buffered
    /// in full have been decoded eagerly; incomplete trailing bytes are
    /// discarded. Queued PCM stays drainable via
    /// [`read_pcm`](Self::read_pcm).
    pub fn close(&mut self) {
        if self.state == StreamState::Open {
            self.state = StreamState::Closed;
            debug!(
                discarded = self.demux.buffered(),
                "opus stream reader closed"
            );
        }
    }

    fn decode_ready(&mut self) -> Result<()> {
        loop {
            let packet = match self.demux.next_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => return Ok(()),
                Err(e) => {
                    // Framing desync cannot be recovered; kill the stream.
                    self.state = StreamState::Closed;
                    return Err(e);
                }
            };
            if packet.is_empty() || OpusHead::is_tags(&packet) {
                continue;
            }
            if OpusHead::is_head(&packet) {
                let head = OpusHead::parse(&packet)?;
                if head.channels as usize != self.channels {
                    self.state = StreamState::Closed;
                    return Err(Error::ChannelMismatch {
                        expected: self.channels,
                        actual: head.channels as usize,
                    });
                }
                continue;
            }
            self.decode_packet(&packet);
        }
    }

    /// Decodes one audio packet, skipping it on codec errors.
    fn decode_packet(&mut self, packet: &[u8]) {
        let samples = match self.decoder.get_nb_samples(packet) {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "skipping malformed opus packet");
                return;
            }
        };
        let start = self.pcm.len();
        self.pcm.resize(start + samples * self.channels, 0.0);
        match self.decoder.decode_float(packet, &mut self.pcm[start..], false) {
            Ok(decoded) => self.pcm.truncate(start + decoded * self.channels),
            Err(e) => {
                self.pcm.truncate(start);
                warn!(error = %e, "skipping undecodable opus packet");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::writer::OpusStreamWriter;
    use super::super::FrameSize;
    use super::*;

    fn sine(freq: f32, rate: u32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| (i as f32 * freq * 2.0 * std::f32::consts::PI / rate as f32).sin() * 0.5)
            .collect()
    }

    fn encode_all(pcm: &[f32], rate: u32, channels: usize) -> Vec<u8> {
        let mut writer = OpusStreamWriter::new(rate, channels).unwrap();
        writer.append_pcm(pcm).unwrap();
        writer.close().unwrap();
        writer.read_bytes()
    }

    fn drain_all(reader: &mut OpusStreamReader) -> Vec<f32> {
        let mut all = Vec::new();
        while let Some(pcm) = reader.read_pcm() {
            if pcm.is_empty() {
                break;
            }
            all.extend_from_slice(&pcm);
        }
        all
    }

    #[test]
    fn test_rejects_bad_configuration() {
        assert!(matches!(
            OpusStreamReader::new(22050, 1),
            Err(Error::UnsupportedRate(22050))
        ));
        assert!(matches!(
            OpusStreamReader::new(48000, 0),
            Err(Error::BadChannels(0))
        ));
    }

    #[test]
    fn test_roundtrip_length() {
        // 1000 samples at frame size 960: one full frame plus one
        // silence-padded frame, so 1920 samples come back.
        let bytes = encode_all(&sine(440.0, 48000, 1000), 48000, 1);
        let mut reader = OpusStreamReader::new(48000, 1).unwrap();
        reader.append_bytes(&bytes).unwrap();
        reader.close();
        assert_eq!(drain_all(&mut reader).len(), 1920);
    }

    #[test]
    fn test_roundtrip_signal_close() {
        let pcm = sine(440.0, 48000, 4800);
        let bytes = encode_all(&pcm, 48000, 1);
        let mut reader = OpusStreamReader::new(48000, 1).unwrap();
        reader.append_bytes(&bytes).unwrap();
        reader.close();
        let decoded = drain_all(&mut reader);

        assert_eq!(decoded.len(), 4800);
        // Lossy codec: compare energy, not samples. Skip the first
        // frame where the codec is still converging.
        let rms = |s: &[f32]| (s.iter().map(|v| v * v).sum::<f32>() / s.len() as f32).sqrt();
        let original = rms(&pcm[960..]);
        let round = rms(&decoded[960..]);
        assert!(
            (original - round).abs() < 0.1,
            "rms {original} vs {round}"
        );
    }

    #[test]
    fn test_chunking_independence() {
        let bytes = encode_all(&sine(440.0, 48000, 3000), 48000, 1);

        let mut whole = OpusStreamReader::new(48000, 1).unwrap();
        whole.append_bytes(&bytes).unwrap();
        whole.close();
        let expected = drain_all(&mut whole);

        let mut byte_wise = OpusStreamReader::new(48000, 1).unwrap();
        for &b in &bytes {
            byte_wise.append_bytes(&[b]).unwrap();
        }
        byte_wise.close();
        assert_eq!(drain_all(&mut byte_wise), expected);
    }

    #[test]
    fn test_close_semantics() {
        let bytes = encode_all(&sine(440.0, 48000, 960), 48000, 1);
        let mut reader = OpusStreamReader::new(48000, 1).unwrap();

        // While open with no data: empty buffer, not an end marker.
        assert_eq!(reader.read_pcm(), Some(Vec::new()));

        reader.append_bytes(&bytes).unwrap();
        reader.close();

        // Drain, then the end marker repeats forever.
        assert!(!reader.read_pcm().unwrap().is_empty());
        assert_eq!(reader.read_pcm(), None);
        assert_eq!(reader.read_pcm(), None);

        // Input side is shut.
        assert!(matches!(reader.append_bytes(&bytes), Err(Error::Closed)));
    }

    #[test]
    fn test_desync_is_fatal() {
        let mut reader = OpusStreamReader::new(48000, 1).unwrap();
        assert!(matches!(
            reader.append_bytes(&[0xde, 0xad, 0xbe, 0xef, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]),
            Err(Error::Desync(_))
        ));
        assert!(matches!(reader.append_bytes(&[0u8; 4]), Err(Error::Closed)));
    }

    #[test]
    fn test_channel_mismatch_rejected() {
        let bytes = encode_all(&vec![0.0; 960 * 2], 48000, 2);
        let mut reader = OpusStreamReader::new(48000, 1).unwrap();
        assert!(matches!(
            reader.append_bytes(&bytes),
            Err(Error::ChannelMismatch { expected: 1, actual: 2 })
        ));
    }

    #[test]
    fn test_stereo_roundtrip() {
        // Interleaved stereo: left is a tone, right is silence.
        let frames = 1920;
        let left = sine(440.0, 48000, frames);
        let mut pcm = Vec::with_capacity(frames * 2);
        for &s in &left {
            pcm.push(s);
            pcm.push(0.0);
        }
        let bytes = encode_all(&pcm, 48000, 2);
        let mut reader = OpusStreamReader::new(48000, 2).unwrap();
        reader.append_bytes(&bytes).unwrap();
        reader.close();
        let decoded = drain_all(&mut reader);
        assert_eq!(decoded.len(), frames * 2);
    }

    #[test]
    fn test_decode_sugar() {
        let pcm = sine(440.0, 48000, 960);
        let mut writer = OpusStreamWriter::new(48000, 1).unwrap();
        let mut reader = OpusStreamReader::new(48000, 1).unwrap();

        let decoded = reader.decode(&writer.encode(&pcm).unwrap()).unwrap();
        assert_eq!(decoded.len(), 960);
        // The sugar drained the queue.
        assert_eq!(reader.read_pcm(), Some(Vec::new()));
    }

    #[test]
    fn test_incremental_push_pull() {
        // Feed writer output to the reader as it appears, in 100-sample
        // pushes, mimicking a live source.
        let pcm = sine(440.0, 48000, 5000);
        let mut writer = OpusStreamWriter::new(48000, 1).unwrap();
        let mut reader = OpusStreamReader::new(48000, 1).unwrap();
        let mut decoded = Vec::new();

        for chunk in pcm.chunks(100) {
            writer.append_pcm(chunk).unwrap();
            reader.append_bytes(&writer.read_bytes()).unwrap();
            if let Some(out) = reader.read_pcm() {
                decoded.extend_from_slice(&out);
            }
        }
        writer.close().unwrap();
        reader.append_bytes(&writer.read_bytes()).unwrap();
        reader.close();
        decoded.extend(drain_all(&mut reader));

        // 5000 rounds up to 6 frames of 960.
        assert_eq!(decoded.len(), 5760);
    }

    #[test]
    fn test_non_default_frame_size_roundtrip() {
        let pcm = sine(200.0, 24000, 1000);
        let mut writer = OpusStreamWriter::new(24000, 1)
            .unwrap()
            .frame_size(FrameSize::F480)
            .unwrap(); // 20 ms at 24 kHz
        writer.append_pcm(&pcm).unwrap();
        writer.close().unwrap();

        let mut reader = OpusStreamReader::new(24000, 1).unwrap();
        reader.append_bytes(&writer.read_bytes()).unwrap();
        reader.close();
        // 1000 rounds up to 3 frames of 480.
        assert_eq!(drain_all(&mut reader).len(), 1440);
    }
}
