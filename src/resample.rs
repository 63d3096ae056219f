//! Sample rate conversion.
//!
//! Band-limited resampling via rubato's FFT resampler. Conversion is
//! pure and deterministic: the same input always produces the same
//! output, and no state is shared between calls.

use rubato::{FftFixedInOut, Resampler};

use crate::error::{Error, Result};
use crate::pcm::PcmBuffer;

/// Frames per processing block.
const CHUNK_SIZE: usize = 1024;

/// Resamples a single channel of PCM data.
///
/// Returns the input unchanged when the rates are equal. The output
/// length is `len * dst_rate / src_rate`; very short inputs produce a
/// short (possibly empty) output rather than an error.
pub fn resample(pcm: &[f32], src_rate: u32, dst_rate: u32) -> Result<Vec<f32>> {
    if src_rate == 0 {
        return Err(Error::InvalidRate(src_rate));
    }
    if dst_rate == 0 {
        return Err(Error::InvalidRate(dst_rate));
    }
    if src_rate == dst_rate {
        return Ok(pcm.to_vec());
    }

    let expected = (pcm.len() as u64 * dst_rate as u64 / src_rate as u64) as usize;
    let mut resampler =
        FftFixedInOut::<f32>::new(src_rate as usize, dst_rate as usize, CHUNK_SIZE, 1)?;

    let mut out = Vec::with_capacity(expected + CHUNK_SIZE);
    let mut output_buf = vec![Vec::new()];
    let mut tail = Vec::new();
    let mut pos = 0;

    while pos < pcm.len() {
        let needed = resampler.input_frames_next();
        output_buf[0].clear();
        output_buf[0].resize(resampler.output_frames_next(), 0.0);

        let input: &[f32] = if pcm.len() - pos >= needed {
            &pcm[pos..pos + needed]
        } else {
            // Zero-pad the final partial block; the output is trimmed
            // back to the expected length below.
            tail.clear();
            tail.extend_from_slice(&pcm[pos..]);
            tail.resize(needed, 0.0);
            &tail
        };

        let (_, written) = resampler.process_into_buffer(&[input], &mut output_buf, None)?;
        out.extend_from_slice(&output_buf[0][..written]);
        pos += needed;
    }

    out.truncate(expected);
    Ok(out)
}

/// Resamples every channel of a buffer to `dst_rate`.
///
/// The channel count is preserved; each channel is converted
/// independently, which keeps the per-channel output lengths identical.
pub fn resample_buffer(buf: &PcmBuffer, dst_rate: u32) -> Result<PcmBuffer> {
    if buf.sample_rate() == dst_rate {
        return Ok(buf.clone());
    }
    let data = buf
        .channel_data()
        .iter()
        .map(|ch| resample(ch, buf.sample_rate(), dst_rate))
        .collect::<Result<Vec<_>>>()?;
    PcmBuffer::new(data, dst_rate)
}
