//! Streaming Opus codec.
//!
//! The two stream adapters decouple caller chunking from codec framing:
//! [`OpusStreamWriter`] turns arbitrary-length PCM pushes into a
//! self-delimiting Ogg/Opus byte stream, [`OpusStreamReader`] turns
//! arbitrary-length byte pushes back into PCM. [`write_opus`] and
//! [`read_opus`] drive them over whole files.

mod accum;
mod ogg;
mod reader;
mod writer;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::pcm::PcmBuffer;
use crate::resample::resample_buffer;

pub use reader::OpusStreamReader;
pub use writer::OpusStreamWriter;

/// Sample rates the Opus codec runs at natively.
pub const OPUS_SAMPLE_RATES: [u32; 5] = [8000, 12000, 16000, 24000, 48000];

/// Rate Opus files are decoded at.
const OPUS_DECODE_RATE: u32 = 48_000;

/// Serial number for the single logical Ogg stream this crate writes.
const OGG_SERIAL: u32 = 1;

/// Legal Opus frame sizes, in samples per channel.
///
/// The set is closed by construction; there is no way to configure a
/// stream with a frame size outside it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FrameSize {
    /// 120 samples (2.5 ms at 48 kHz).
    F120,
    /// 240 samples (5 ms at 48 kHz).
    F240,
    /// 480 samples (10 ms at 48 kHz).
    F480,
    /// 960 samples (20 ms at 48 kHz).
    #[default]
    F960,
    /// 1920 samples (40 ms at 48 kHz).
    F1920,
    /// 2880 samples (60 ms at 48 kHz).
    F2880,
}

impl FrameSize {
    /// Returns the frame length in samples per channel.
    pub fn samples(self) -> usize {
        match self {
            FrameSize::F120 => 120,
            FrameSize::F240 => 240,
            FrameSize::F480 => 480,
            FrameSize::F960 => 960,
            FrameSize::F1920 => 1920,
            FrameSize::F2880 => 2880,
        }
    }

    /// Looks up the variant for a sample count, `None` for any count
    /// outside the legal set.
    pub fn from_samples(samples: usize) -> Option<FrameSize> {
        match samples {
            120 => Some(FrameSize::F120),
            240 => Some(FrameSize::F240),
            480 => Some(FrameSize::F480),
            960 => Some(FrameSize::F960),
            1920 => Some(FrameSize::F1920),
            2880 => Some(FrameSize::F2880),
            _ => None,
        }
    }

    /// Whether this frame size is a legal Opus frame duration
    /// (2.5, 5, 10, 20, 40 or 60 ms) at the given sample rate.
    pub fn legal_at(self, sample_rate: u32) -> bool {
        // Duration in units of 2.5 ms.
        let scaled = self.samples() as u32 * 400;
        if sample_rate == 0 || scaled % sample_rate != 0 {
            return false;
        }
        matches!(scaled / sample_rate, 1 | 2 | 4 | 8 | 16 | 24)
    }
}

/// What to do with a final partial frame when a writer closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PadPolicy {
    /// Zero-pad the carry to one full frame and encode it.
    #[default]
    Silence,
    /// Discard the carry.
    Drop,
}

/// Lifecycle of a stream adapter. The transition is one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamState {
    Open,
    Closed,
}

pub(crate) fn validate_rate(sample_rate: u32) -> Result<()> {
    if OPUS_SAMPLE_RATES.contains(&sample_rate) {
        Ok(())
    } else {
        Err(Error::UnsupportedRate(sample_rate))
    }
}

pub(crate) fn opus_channels(channels: usize) -> Result<opus::Channels> {
    match channels {
        1 => Ok(opus::Channels::Mono),
        2 => Ok(opus::Channels::Stereo),
        c => Err(Error::BadChannels(c)),
    }
}

/// Encodes a PCM buffer into an Ogg/Opus file.
///
/// With `resample_to` the buffer is first converted to that rate; if
/// the rate to encode at is not Opus-native the buffer is converted to
/// 48 kHz, so the persisted stream is always at a rate the codec
/// accepts (callers must not assume an arbitrary rate is honored).
pub fn write_opus<P: AsRef<Path>>(
    path: P,
    buf: &PcmBuffer,
    resample_to: Option<u32>,
) -> Result<()> {
    let mut buf = std::borrow::Cow::Borrowed(buf);
    if let Some(rate) = resample_to {
        if rate != buf.sample_rate() {
            buf = std::borrow::Cow::Owned(resample_buffer(&buf, rate)?);
        }
    }
    if !OPUS_SAMPLE_RATES.contains(&buf.sample_rate()) {
        buf = std::borrow::Cow::Owned(resample_buffer(&buf, OPUS_DECODE_RATE)?);
    }

    let mut writer = OpusStreamWriter::new(buf.sample_rate(), buf.channels())?;
    let mut file = BufWriter::new(File::create(path)?);
    writer.append_pcm(&buf.interleaved())?;
    file.write_all(&writer.read_bytes())?;
    writer.close()?;
    file.write_all(&writer.read_bytes())?;
    file.flush()?;
    Ok(())
}

/// Decodes a whole Ogg/Opus file.
///
/// Returns the PCM and the decode rate, which is fixed at 48 kHz
/// regardless of the rate the stream was recorded at.
pub fn read_opus<P: AsRef<Path>>(path: P) -> Result<(PcmBuffer, u32)> {
    let bytes = std::fs::read(path)?;

    // Peek at the identification header for the channel count.
    let mut demux = ogg::Demuxer::new();
    demux.push(&bytes);
    let head = match demux.next_packet()? {
        Some(packet) => ogg::OpusHead::parse(&packet)?,
        None => return Err(Error::BadHeader("no complete ogg page")),
    };

    let mut reader = OpusStreamReader::new(OPUS_DECODE_RATE, head.channels as usize)?;
    reader.append_bytes(&bytes)?;
    reader.close();

    let mut all = Vec::new();
    while let Some(pcm) = reader.read_pcm() {
        all.extend_from_slice(&pcm);
    }
    let buf = PcmBuffer::from_interleaved(&all, head.channels as usize, OPUS_DECODE_RATE)?;
    Ok((buf, OPUS_DECODE_RATE))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, rate: u32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| (i as f32 * freq * 2.0 * std::f32::consts::PI / rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_frame_size_set() {
        for (samples, expected) in [
            (120, Some(FrameSize::F120)),
            (960, Some(FrameSize::F960)),
            (2880, Some(FrameSize::F2880)),
            (0, None),
            (961, None),
            (4000, None),
        ] {
            assert_eq!(FrameSize::from_samples(samples), expected);
        }
        assert_eq!(FrameSize::default().samples(), 960);
    }

    #[test]
    fn test_frame_size_legality_per_rate() {
        // Every member of the set is legal at 48 kHz.
        for fs in [
            FrameSize::F120,
            FrameSize::F240,
            FrameSize::F480,
            FrameSize::F960,
            FrameSize::F1920,
            FrameSize::F2880,
        ] {
            assert!(fs.legal_at(48000));
        }
        // 960 samples at 16 kHz is 60 ms: legal.
        assert!(FrameSize::F960.legal_at(16000));
        // 120 samples at 8 kHz would be 15 ms: not legal.
        assert!(!FrameSize::F120.legal_at(8000));
        assert!(!FrameSize::F2880.legal_at(24000));
    }

    #[test]
    fn test_validate_rate() {
        for rate in OPUS_SAMPLE_RATES {
            assert!(validate_rate(rate).is_ok());
        }
        assert!(matches!(validate_rate(44100), Err(Error::UnsupportedRate(44100))));
        assert!(matches!(validate_rate(0), Err(Error::UnsupportedRate(0))));
    }

    #[test]
    fn test_write_read_opus_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.opus");

        let buf = PcmBuffer::mono(sine(440.0, 48000, 4800), 48000).unwrap();
        write_opus(&path, &buf, None).unwrap();

        let (decoded, rate) = read_opus(&path).unwrap();
        assert_eq!(rate, 48000);
        assert_eq!(decoded.channels(), 1);
        assert_eq!(decoded.frames(), 4800);
    }

    #[test]
    fn test_write_opus_resamples_foreign_rates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cd.opus");

        // 44.1 kHz is not Opus-native; the file must still decode, at
        // a duration close to the original half second.
        let buf = PcmBuffer::mono(sine(440.0, 44100, 22050), 44100).unwrap();
        write_opus(&path, &buf, None).unwrap();

        let (decoded, rate) = read_opus(&path).unwrap();
        assert_eq!(rate, 48000);
        assert!((decoded.duration_sec() - 0.5).abs() < 0.05);
    }

    #[test]
    fn test_write_opus_with_resample_to() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("down.opus");

        let buf = PcmBuffer::mono(sine(440.0, 48000, 9600), 48000).unwrap();
        write_opus(&path, &buf, Some(16000)).unwrap();

        let (decoded, rate) = read_opus(&path).unwrap();
        assert_eq!(rate, 48000);
        assert!((decoded.duration_sec() - 0.2).abs() < 0.05);
    }

    #[test]
    fn test_read_opus_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.opus");
        std::fs::write(&path, vec![0u8; 256]).unwrap();
        assert!(read_opus(&path).is_err());
    }

    #[test]
    fn test_stereo_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.opus");

        let buf = PcmBuffer::new(
            vec![sine(440.0, 48000, 1920), sine(220.0, 48000, 1920)],
            48000,
        )
        .unwrap();
        write_opus(&path, &buf, None).unwrap();

        let (decoded, _) = read_opus(&path).unwrap();
        assert_eq!(decoded.channels(), 2);
        assert_eq!(decoded.frames(), 1920);
    }
}
