//! Format normalization: channel layout, sample rate, numeric representation

use log::debug;
use rubato::{FftFixedIn, Resampler};

use crate::buffer::AudioBuffer;
use crate::error::{AudioError, AudioResult};

/// Input chunk size handed to the FFT resampler
const RESAMPLE_CHUNK: usize = 1024;
/// Sub-chunks per resampler chunk
const RESAMPLE_SUB_CHUNKS: usize = 2;

/// Brings arbitrary decoded audio to mono f32 at a fixed rate
pub struct FormatNormalizer;

impl FormatNormalizer {
    /// Coerce samples, mono-ize, and resample to `target_rate`.
    ///
    /// Non-finite samples are zeroed before resampling. Idempotent at a fixed
    /// target rate.
    pub fn normalize(buffer: &AudioBuffer, target_rate: u32) -> AudioResult<AudioBuffer> {
        let coerced = Self::coerce(buffer);
        let mono = Self::to_mono(&coerced);
        Self::resample(&mono, target_rate)
    }

    /// Down-mix by averaging channels.
    ///
    /// This is an approximation: phase-cancelling content between channels is lost.
    pub fn to_mono(buffer: &AudioBuffer) -> AudioBuffer {
        if buffer.channel_count <= 1 {
            return buffer.clone();
        }

        let channels = buffer.channel_count;
        let mono: Vec<f32> = buffer
            .samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();

        debug!("[Format] down-mixed {} channels to mono", channels);
        AudioBuffer::mono(mono, buffer.sample_rate)
    }

    /// Resample every channel to `target_rate`; a no-op when rates match
    pub fn resample(buffer: &AudioBuffer, target_rate: u32) -> AudioResult<AudioBuffer> {
        if target_rate == 0 {
            return Err(AudioError::Resample("target rate must be > 0".to_string()));
        }
        if buffer.sample_rate == target_rate {
            return Ok(buffer.clone());
        }
        if buffer.is_empty() {
            return Err(AudioError::EmptyAudio);
        }

        let channels = buffer.channel_count;
        let planes: Vec<Vec<f32>> = (0..channels).map(|ch| buffer.channel(ch)).collect();
        let resampled = resample_planes(&planes, buffer.sample_rate, target_rate)?;

        let frames = resampled.first().map(Vec::len).unwrap_or(0);
        let mut samples = Vec::with_capacity(frames * channels);
        for frame in 0..frames {
            for plane in &resampled {
                samples.push(plane[frame]);
            }
        }

        debug!(
            "[Format] resampled {}Hz -> {}Hz ({} -> {} frames)",
            buffer.sample_rate,
            target_rate,
            buffer.frames(),
            frames
        );

        Ok(AudioBuffer {
            samples,
            sample_rate: target_rate,
            channel_count: channels,
        })
    }

    /// Canonical representation: finite f32, non-finite values become silence
    pub fn coerce(buffer: &AudioBuffer) -> AudioBuffer {
        if buffer.samples.iter().all(|s| s.is_finite()) {
            return buffer.clone();
        }
        AudioBuffer {
            samples: buffer
                .samples
                .iter()
                .map(|&s| if s.is_finite() { s } else { 0.0 })
                .collect(),
            sample_rate: buffer.sample_rate,
            channel_count: buffer.channel_count,
        }
    }
}

/// Band-limited FFT resampling of de-interleaved planes.
///
/// Output is trimmed to `ceil(len * to / from)` frames with the resampler delay removed.
fn resample_planes(planes: &[Vec<f32>], from: u32, to: u32) -> AudioResult<Vec<Vec<f32>>> {
    let channels = planes.len();
    let input_len = planes.first().map(Vec::len).unwrap_or(0);
    let expected = (input_len as f64 * to as f64 / from as f64).ceil() as usize;

    let mut resampler = FftFixedIn::<f32>::new(
        from as usize,
        to as usize,
        RESAMPLE_CHUNK,
        RESAMPLE_SUB_CHUNKS,
        channels,
    )
    .map_err(|e| AudioError::Resample(format!("Failed to create resampler: {}", e)))?;

    let delay = resampler.output_delay();
    let mut out: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay + RESAMPLE_CHUNK); channels];

    let mut pos = 0;
    while pos < input_len {
        let needed = resampler.input_frames_next();
        let end = (pos + needed).min(input_len);

        let chunk: Vec<&[f32]> = planes.iter().map(|p| &p[pos..end]).collect();
        let result = if end - pos == needed {
            resampler.process(&chunk, None)
        } else {
            resampler.process_partial(Some(chunk.as_slice()), None)
        };
        let frames =
            result.map_err(|e| AudioError::Resample(format!("Resampling failed: {}", e)))?;

        for (dst, src) in out.iter_mut().zip(frames) {
            dst.extend_from_slice(&src);
        }
        pos = end;
    }

    // Flush the delay line
    while out[0].len() < delay + expected {
        let frames = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| AudioError::Resample(format!("Resampler flush failed: {}", e)))?;
        if frames.first().map_or(true, Vec::is_empty) {
            break;
        }
        for (dst, src) in out.iter_mut().zip(frames) {
            dst.extend_from_slice(&src);
        }
    }

    Ok(out
        .into_iter()
        .map(|plane| {
            let start = delay.min(plane.len());
            let end = (delay + expected).min(plane.len());
            let mut trimmed = plane[start..end].to_vec();
            trimmed.resize(expected, 0.0);
            trimmed
        })
        .collect())
}
