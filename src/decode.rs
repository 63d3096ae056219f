//! Whole-file audio decoding via symphonia.
//!
//! [`FileReader`] probes a compressed audio file (WAV, MP3, FLAC, Ogg,
//! AAC, ...) and decodes it to planar `f32` PCM, either in full or as a
//! seek-accurate time range. [`read`] and [`durations`] are the
//! whole-file conveniences built on top of it.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use symphonia::core::units::{Time, TimeBase};
use tracing::debug;

use crate::error::{Error, Result};
use crate::pcm::PcmBuffer;
use crate::resample::resample_buffer;

/// Decodes one audio file to PCM.
///
/// Construction probes the container and picks the first decodable
/// audio track; rate, channel count and duration are available without
/// decoding anything.
pub struct FileReader {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    time_base: TimeBase,
    start_ts: u64,
    duration: Time,
    sample_rate: u32,
    channels: usize,
}

impl FileReader {
    /// Opens an audio file and prepares a decoder for its first
    /// decodable track.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let src = std::fs::File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(src), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|v| v.to_str()) {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(Error::NoAudioTrack)?;
        let params = &track.codec_params;

        let time_base = params.time_base.ok_or(Error::MissingMetadata("time base"))?;
        let sample_rate = params.sample_rate.ok_or(Error::MissingMetadata("sample rate"))?;
        let n_frames = params.n_frames.ok_or(Error::MissingMetadata("frame count"))?;
        let channels = match params.channels {
            Some(c) => c.count(),
            None => return Err(Error::MissingMetadata("channel count")),
        };
        if channels == 0 {
            return Err(Error::BadChannels(0));
        }

        let decoder =
            symphonia::default::get_codecs().make(params, &DecoderOptions::default())?;
        let track_id = track.id;
        let start_ts = params.start_ts;
        let duration = time_base.calc_time(n_frames);
        debug!(?path, sample_rate, channels, "opened audio file");

        Ok(Self {
            format,
            decoder,
            track_id,
            time_base,
            start_ts,
            duration,
            sample_rate,
            channels,
        })
    }

    /// Duration of the audio track in seconds.
    pub fn duration_sec(&self) -> f64 {
        self.duration.seconds as f64 + self.duration.frac
    }

    /// Native sample rate of the track.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of channels of the track.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Decodes the whole file.
    pub fn decode_all(&mut self) -> Result<PcmBuffer> {
        let mut data = vec![Vec::new(); self.channels];
        self.format.seek(
            SeekMode::Accurate,
            SeekTo::TimeStamp { ts: self.start_ts, track_id: self.track_id },
        )?;
        self.decoder.reset();

        while let Some(packet) = self.next_audio_packet()? {
            let decoded = self.decoder.decode(&packet)?;
            append_all(&mut data, decoded);
        }
        PcmBuffer::new(data, self.sample_rate)
    }

    /// Decodes the range `start_sec..start_sec + duration_sec`.
    ///
    /// Decoding stops early at end of file; with `pad` the output is
    /// zero-extended to the full requested duration. The returned
    /// `usize` is the unpadded frame count either way.
    pub fn decode(
        &mut self,
        start_sec: f64,
        duration_sec: f64,
        pad: bool,
    ) -> Result<(PcmBuffer, usize)> {
        let start_ts = self.time_base.calc_timestamp(time_from_sec(start_sec));
        let frames_wanted = self.time_base.calc_timestamp(time_from_sec(duration_sec)) as usize;
        let mut data = vec![Vec::with_capacity(frames_wanted); self.channels];

        let seeked_to = self.format.seek(
            SeekMode::Accurate,
            SeekTo::TimeStamp { ts: start_ts, track_id: self.track_id },
        )?;
        self.decoder.reset();
        let mut to_skip = start_ts.saturating_sub(seeked_to.actual_ts) as usize;

        while data[0].len() < frames_wanted {
            let Some(packet) = self.next_audio_packet()? else { break };
            let decoded = self.decoder.decode(&packet)?;
            to_skip = append_range(&mut data, decoded, to_skip, frames_wanted);
        }

        let unpadded = data[0].len();
        if pad && unpadded < frames_wanted {
            for ch in data.iter_mut() {
                ch.resize(frames_wanted, 0.0);
            }
        }
        Ok((PcmBuffer::new(data, self.sample_rate)?, unpadded))
    }

    /// Returns the next packet of the selected track, or `None` at end
    /// of file.
    fn next_audio_packet(&mut self) -> Result<Option<symphonia::core::formats::Packet>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            };
            // Discard stale metadata revisions as they are superseded.
            while !self.format.metadata().is_latest() {
                self.format.metadata().pop();
            }
            if packet.track_id() == self.track_id {
                return Ok(Some(packet));
            }
        }
    }
}

fn time_from_sec(sec: f64) -> Time {
    Time::new(sec as u64, sec.fract())
}

/// Applies `$body` to the concrete `AudioBuffer` behind an
/// `AudioBufferRef`, whatever its sample format.
macro_rules! with_audio_buffer {
    ($decoded:expr, |$buf:ident| $body:expr) => {
        match $decoded {
            AudioBufferRef::U8($buf) => $body,
            AudioBufferRef::U16($buf) => $body,
            AudioBufferRef::U24($buf) => $body,
            AudioBufferRef::U32($buf) => $body,
            AudioBufferRef::S8($buf) => $body,
            AudioBufferRef::S16($buf) => $body,
            AudioBufferRef::S24($buf) => $body,
            AudioBufferRef::S32($buf) => $body,
            AudioBufferRef::F32($buf) => $body,
            AudioBufferRef::F64($buf) => $body,
        }
    };
}

/// Appends a decoded buffer to the planar output, converting to `f32`.
fn append_all(data: &mut [Vec<f32>], decoded: AudioBufferRef<'_>) {
    with_audio_buffer!(decoded, |buf| extend_planar(data, buf.as_ref()));
}

/// Range variant of [`append_all`]: skips `to_skip` leading frames and
/// never grows a channel past `frames_wanted`. Returns the frames still
/// to skip.
fn append_range(
    data: &mut [Vec<f32>],
    decoded: AudioBufferRef<'_>,
    to_skip: usize,
    frames_wanted: usize,
) -> usize {
    with_audio_buffer!(decoded, |buf| extend_planar_range(
        data,
        buf.as_ref(),
        to_skip,
        frames_wanted
    ))
}

fn extend_planar<T>(data: &mut [Vec<f32>], buf: &AudioBuffer<T>)
where
    T: Sample,
    f32: symphonia::core::conv::FromSample<T>,
{
    use symphonia::core::conv::FromSample;
    for (ch, out) in data.iter_mut().enumerate() {
        out.extend(buf.chan(ch).iter().map(|&v| f32::from_sample(v)));
    }
}

fn extend_planar_range<T>(
    data: &mut [Vec<f32>],
    buf: &AudioBuffer<T>,
    to_skip: usize,
    frames_wanted: usize,
) -> usize
where
    T: Sample,
    f32: symphonia::core::conv::FromSample<T>,
{
    use symphonia::core::conv::FromSample;
    let mut remaining_skip = 0;
    for (ch, out) in data.iter_mut().enumerate() {
        let chan = buf.chan(ch);
        if to_skip < chan.len() {
            let chan = &chan[to_skip..];
            let missing = frames_wanted.saturating_sub(out.len());
            let take = usize::min(chan.len(), missing);
            out.extend(chan[..take].iter().map(|&v| f32::from_sample(v)));
        } else {
            remaining_skip = to_skip - chan.len();
        }
    }
    remaining_skip
}

/// Reads an audio file to PCM.
///
/// `start_sec`/`duration_sec` select a range (either may be omitted);
/// `target_rate` resamples the result. Returns the PCM and its rate.
pub fn read<P: AsRef<Path>>(
    path: P,
    start_sec: Option<f64>,
    duration_sec: Option<f64>,
    target_rate: Option<u32>,
) -> Result<(PcmBuffer, u32)> {
    let mut reader = FileReader::open(path)?;
    let buf = match (start_sec, duration_sec) {
        (None, None) => reader.decode_all()?,
        (start, duration) => {
            let start = start.unwrap_or(0.0);
            // An absent duration means "to the end of the file".
            let duration = duration.unwrap_or_else(|| reader.duration_sec() - start + 1.0);
            reader.decode(start, duration, false)?.0
        }
    };
    let buf = match target_rate {
        Some(rate) => resample_buffer(&buf, rate)?,
        None => buf,
    };
    let rate = buf.sample_rate();
    Ok((buf, rate))
}

/// Returns the duration in seconds for each of the given audio files.
///
/// Files that cannot be opened or read yield `None` without aborting
/// the rest of the batch; a short prefix of each file is decoded to
/// confirm it is actually readable. Files are probed in parallel.
pub fn durations(paths: &[PathBuf]) -> Vec<Option<f64>> {
    paths
        .par_iter()
        .map(|path| {
            let mut reader = FileReader::open(path).ok()?;
            reader.decode(0.0, 0.1, false).ok()?;
            Some(reader.duration_sec())
        })
        .collect()
}
