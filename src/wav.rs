//! Canonical WAV serialization.
//!
//! Writes uncompressed 16-bit PCM in a standard RIFF/WAVE container.
//! Purely a formatting concern: no streaming state, no reading.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;
use crate::pcm::PcmBuffer;

/// Sample types that can be written as 16-bit PCM.
pub trait Sample {
    fn to_i16(&self) -> i16;
}

impl Sample for f32 {
    fn to_i16(&self) -> i16 {
        (self.clamp(-1.0, 1.0) * 32767.0) as i16
    }
}

impl Sample for f64 {
    fn to_i16(&self) -> i16 {
        (self.clamp(-1.0, 1.0) * 32767.0) as i16
    }
}

impl Sample for i16 {
    fn to_i16(&self) -> i16 {
        *self
    }
}

/// Writes interleaved samples as a 16-bit PCM WAV stream.
///
/// The samples are assumed to already be interleaved by channel.
pub fn write<W: Write, S: Sample>(
    w: &mut W,
    samples: &[S],
    channels: u16,
    sample_rate: u32,
) -> std::io::Result<()> {
    // https://en.wikipedia.org/wiki/WAV#WAV_file_header
    let data_len = samples.len() as u32 * 2;
    let riff_len = 4 + 24 + 8 + data_len; // WAVE tag + fmt block + data block
    let bytes_per_second = sample_rate * 2 * channels as u32;

    w.write_all(b"RIFF")?;
    w.write_all(&riff_len.to_le_bytes())?;
    w.write_all(b"WAVE")?;

    w.write_all(b"fmt ")?;
    w.write_all(&16u32.to_le_bytes())?; // fmt block length
    w.write_all(&1u16.to_le_bytes())?; // PCM
    w.write_all(&channels.to_le_bytes())?;
    w.write_all(&sample_rate.to_le_bytes())?;
    w.write_all(&bytes_per_second.to_le_bytes())?;
    w.write_all(&(channels * 2).to_le_bytes())?; // frame alignment
    w.write_all(&16u16.to_le_bytes())?; // bits per sample

    w.write_all(b"data")?;
    w.write_all(&data_len.to_le_bytes())?;
    for sample in samples {
        w.write_all(&sample.to_i16().to_le_bytes())?;
    }
    Ok(())
}

/// Writes a PCM buffer to a WAV file.
pub fn write_wav<P: AsRef<Path>>(path: P, buf: &PcmBuffer) -> Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    write(
        &mut file,
        &buf.interleaved(),
        buf.channels() as u16,
        buf.sample_rate(),
    )?;
    file.flush()?;
    Ok(())
}
