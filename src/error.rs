//! Crate-wide error type.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all audio operations.
///
/// Configuration problems (bad rates, channel counts) are reported at
/// construction time; state problems (using a closed stream) and data
/// problems (corrupt bytes, unsupported files) at the call that hit them.
#[derive(Error, Debug)]
pub enum Error {
    /// Sample rate the Opus codec cannot run at.
    #[error("unsupported opus sample rate {0} (expected 8000, 12000, 16000, 24000 or 48000)")]
    UnsupportedRate(u32),

    /// Sample rate that is not a positive number of Hz.
    #[error("invalid sample rate {0}")]
    InvalidRate(u32),

    /// Channel count outside what the codec or buffer supports.
    #[error("unsupported channel count {0}")]
    BadChannels(usize),

    /// Frame size that does not correspond to a legal Opus frame
    /// duration at the configured sample rate.
    #[error("frame size of {samples} samples is not a legal opus frame at {sample_rate} Hz")]
    BadFrameSize { samples: usize, sample_rate: u32 },

    /// PCM input whose length is not a whole number of frames.
    #[error("ragged pcm input: {samples} samples is not a multiple of {channels} channels")]
    RaggedPcm { samples: usize, channels: usize },

    /// Two buffers or streams disagree on channel count.
    #[error("channel count mismatch: expected {expected}, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },

    /// Two buffers disagree on sample rate.
    #[error("sample rate mismatch: expected {expected}, got {actual}")]
    RateMismatch { expected: u32, actual: u32 },

    /// Operation on a stream that has already been closed.
    #[error("stream is closed")]
    Closed,

    /// Ogg framing lost sync; the stream cannot be recovered.
    #[error("ogg framing desync: {0}")]
    Desync(&'static str),

    /// Malformed OpusHead header packet.
    #[error("malformed opus header: {0}")]
    BadHeader(&'static str),

    /// No track in the container has a decodable codec.
    #[error("no decodable audio track")]
    NoAudioTrack,

    /// Container metadata the decoder requires is absent.
    #[error("missing track metadata: {0}")]
    MissingMetadata(&'static str),

    /// Error from the Opus codec; fatal to the owning stream instance.
    #[error("opus codec error: {0}")]
    Opus(#[from] opus::Error),

    /// Error from the resampler.
    #[error("resample error: {0}")]
    Resample(String),

    /// Container or codec error while decoding a file.
    #[error("audio format error: {0}")]
    Format(#[from] symphonia::core::errors::Error),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rubato::ResamplerConstructionError> for Error {
    fn from(e: rubato::ResamplerConstructionError) -> Self {
        Error::Resample(e.to_string())
    }
}

impl From<rubato::ResampleError> for Error {
    fn from(e: rubato::ResampleError) -> Self {
        Error::Resample(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnsupportedRate(44100);
        assert!(err.to_string().contains("44100"));

        let err = Error::Closed;
        assert!(err.to_string().contains("closed"));

        let err = Error::RaggedPcm { samples: 7, channels: 2 };
        assert!(err.to_string().contains("7"));
        assert!(err.to_string().contains("2"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
