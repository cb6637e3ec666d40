//! Audio decoding module
//!
//! Format detection is by extension:
//! - WAV is read with hound, falling back to symphonia for exotic encodings
//! - FLAC, MP3, OGG Vorbis, M4A/AAC go through symphonia with the extension
//!   as a probe hint, then once more without a hint if that fails

use std::fs::File;
use std::io::Cursor;
use std::path::Path;

use log::{debug, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::buffer::AudioBuffer;
use crate::error::{AudioError, AudioResult};

// ═══════════════════════════════════════════════════════════════════════════════
// FORMAT DETECTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Input container format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Flac,
    Mp3,
    Ogg,
    Aac,
    Unknown,
}

impl AudioFormat {
    pub fn from_extension(ext: &str) -> Self {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "wav" | "wave" => Self::Wav,
            "flac" => Self::Flac,
            "mp3" => Self::Mp3,
            "ogg" | "oga" => Self::Ogg,
            "aac" | "m4a" | "mp4" => Self::Aac,
            _ => Self::Unknown,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }

    /// Extension handed to symphonia as a probe hint
    fn hint_extension(&self) -> Option<&'static str> {
        match self {
            Self::Wav => Some("wav"),
            Self::Flac => Some("flac"),
            Self::Mp3 => Some("mp3"),
            Self::Ogg => Some("ogg"),
            Self::Aac => Some("m4a"),
            Self::Unknown => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DECODER
// ═══════════════════════════════════════════════════════════════════════════════

/// Universal audio decoder
pub struct AudioDecoder;

impl AudioDecoder {
    /// Extensions accepted on input
    pub fn supported_extensions() -> &'static [&'static str] {
        &["wav", "mp3", "flac", "m4a", "aac", "ogg"]
    }

    /// Decode an audio file
    pub fn decode_file(path: &Path) -> AudioResult<AudioBuffer> {
        let format = AudioFormat::from_path(path);
        debug!("[Decoder] {} as {:?}", path.display(), format);

        if format == AudioFormat::Wav {
            match File::open(path)
                .map_err(AudioError::from)
                .and_then(|f| Self::decode_wav(std::io::BufReader::new(f)))
            {
                Ok(buffer) => return Ok(buffer),
                Err(AudioError::Io(e)) => return Err(AudioError::Io(e)),
                Err(e) => warn!("[Decoder] hound rejected {}: {}; trying symphonia", path.display(), e),
            }
        }

        Self::decode_with_fallback(format, || {
            let file = File::open(path)?;
            Ok(Box::new(file) as Box<dyn MediaSource>)
        })
    }

    /// Decode audio held in memory; `extension` is a format hint such as "mp3"
    pub fn decode_bytes(bytes: &[u8], extension: Option<&str>) -> AudioResult<AudioBuffer> {
        let format = extension
            .map(AudioFormat::from_extension)
            .unwrap_or(AudioFormat::Unknown);

        if format == AudioFormat::Wav {
            match Self::decode_wav(Cursor::new(bytes)) {
                Ok(buffer) => return Ok(buffer),
                Err(e) => warn!("[Decoder] hound rejected in-memory WAV: {}; trying symphonia", e),
            }
        }

        Self::decode_with_fallback(format, || {
            Ok(Box::new(Cursor::new(bytes.to_vec())) as Box<dyn MediaSource>)
        })
    }

    /// Primary symphonia decode with the format hint, then a hint-less retry
    fn decode_with_fallback<F>(format: AudioFormat, open: F) -> AudioResult<AudioBuffer>
    where
        F: Fn() -> AudioResult<Box<dyn MediaSource>>,
    {
        let primary = Self::decode_symphonia(open()?, format.hint_extension());
        match primary {
            Ok(buffer) => Ok(buffer),
            Err(e) if format.hint_extension().is_some() => {
                warn!("[Decoder] {:?} decode failed ({}); probing without hint", format, e);
                Self::decode_symphonia(open()?, None).map_err(|fallback| {
                    AudioError::Decode(format!("{} (fallback: {})", e, fallback))
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Decode PCM/float WAV with hound
    fn decode_wav<R: std::io::Read>(reader: R) -> AudioResult<AudioBuffer> {
        let reader = hound::WavReader::new(reader)?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Int => {
                let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max_val))
                    .collect::<Result<_, _>>()?
            }
            hound::SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
        };

        AudioBuffer::new(samples, spec.sample_rate, spec.channels as usize)
    }

    /// Decode any container symphonia can probe
    fn decode_symphonia(
        source: Box<dyn MediaSource>,
        extension: Option<&str>,
    ) -> AudioResult<AudioBuffer> {
        let mss = MediaSourceStream::new(source, Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| AudioError::Decode(format!("Failed to probe format: {}", e)))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AudioError::Decode("No audio track found".to_string()))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();
        let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
        let mut channels = codec_params.channels.map(|c| c.count()).unwrap_or(0);

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| AudioError::Decode(format!("Failed to create decoder: {}", e)))?;

        let mut samples: Vec<f32> = Vec::new();
        let mut sample_buf: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => {
                    return Err(AudioError::Decode(format!("Packet read error: {}", e)));
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    sample_rate = spec.rate;
                    channels = spec.channels.count();

                    let buf = sample_buf.get_or_insert_with(|| {
                        SampleBuffer::<f32>::new(decoded.capacity() as u64, spec)
                    });
                    if buf.capacity() < decoded.capacity() * channels {
                        *buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    }
                    buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buf.samples());
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    debug!("[Decoder] skipping corrupt packet: {}", e);
                    continue;
                }
                Err(e) => {
                    return Err(AudioError::Decode(format!("Decode error: {}", e)));
                }
            }
        }

        if channels == 0 || sample_rate == 0 {
            return Err(AudioError::Decode(
                "Stream did not report a sample rate or channel layout".to_string(),
            ));
        }

        AudioBuffer::new(samples, sample_rate, channels)
    }
}
