//! Audio decoding, resampling and streaming Opus codec.
//!
//! This crate provides:
//!
//! - `decode`: whole-file decoding of compressed audio (WAV, MP3,
//!   FLAC, Ogg, AAC, ...) to `f32` PCM via symphonia
//! - `resample`: band-limited sample rate conversion via rubato
//! - `codec`: incremental Opus encode/decode for PCM and bytes that
//!   arrive in arbitrarily sized chunks
//! - `wav`: canonical 16-bit WAV serialization
//!
//! # Streaming example
//!
//! ```no_run
//! use opustream::{OpusStreamReader, OpusStreamWriter};
//!
//! # fn main() -> opustream::Result<()> {
//! let mut writer = OpusStreamWriter::new(48000, 1)?;
//! let mut reader = OpusStreamReader::new(48000, 1)?;
//!
//! // PCM goes in with whatever chunking the source produces...
//! writer.append_pcm(&vec![0.0f32; 1000])?;
//! // ...and encoded bytes come out as frames fill up.
//! reader.append_bytes(&writer.read_bytes())?;
//!
//! writer.close()?;
//! reader.append_bytes(&writer.read_bytes())?;
//! reader.close();
//! while let Some(pcm) = reader.read_pcm() {
//!     // use pcm
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod decode;
pub mod error;
pub mod pcm;
pub mod resample;
pub mod wav;

pub use codec::{
    read_opus, write_opus, FrameSize, OpusStreamReader, OpusStreamWriter, PadPolicy,
    OPUS_SAMPLE_RATES,
};
pub use decode::{durations, read, FileReader};
pub use error::{Error, Result};
pub use pcm::PcmBuffer;
pub use resample::{resample, resample_buffer};
pub use wav::write_wav;
