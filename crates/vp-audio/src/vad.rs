//! Heuristic voice activity analysis
//!
//! Frames are classified from two spectral features:
//! - spectral centroid above `voice_threshold` (kHz)
//! - zero-crossing rate below `zcr_threshold` (crossings per sample)
//!
//! This is an approximation, not a trained detector. When feature extraction
//! fails the whole buffer is reported as voiced so downstream duration checks
//! never reject audio because of an analyzer fault.

use std::fmt;
use std::sync::Arc;

use log::{debug, warn};
use realfft::{RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::buffer::AudioBuffer;
use crate::config::VadConfig;
use crate::format::FormatNormalizer;

// ═══════════════════════════════════════════════════════════════════════════════
// RESULT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Speech-bearing time span in seconds, `end_time > start_time`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceSegment {
    pub start_time: f64,
    pub end_time: f64,
}

impl VoiceSegment {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Per-frame spectral features
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameFeatures {
    /// Spectral centroid (Hz)
    pub centroid_hz: f32,
    /// Frequency below which `rolloff_percent` of the magnitude lies (Hz)
    pub rolloff_hz: f32,
    /// Zero crossings per sample
    pub zero_crossing_rate: f32,
    pub voiced: bool,
}

/// Analyzer output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceAnalysis {
    pub segments: Vec<VoiceSegment>,
    pub voice_duration: f64,
    pub total_duration: f64,
    /// Feature extraction failed and the buffer was assumed voiced
    pub fell_back: bool,
}

impl VoiceAnalysis {
    /// Voiced share of the buffer, 0.0 for empty input
    pub fn voice_ratio(&self) -> f64 {
        if self.total_duration > 0.0 {
            self.voice_duration / self.total_duration
        } else {
            0.0
        }
    }

    fn whole_buffer(total_duration: f64) -> Self {
        let segments = if total_duration > 0.0 {
            vec![VoiceSegment {
                start_time: 0.0,
                end_time: total_duration,
            }]
        } else {
            Vec::new()
        };
        Self {
            segments,
            voice_duration: total_duration,
            total_duration,
            fell_back: true,
        }
    }
}

/// Internal feature extraction fault
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisFault {
    NonFinite,
    InvalidFrame { frame_length: usize, hop_length: usize },
    Fft(String),
}

impl fmt::Display for AnalysisFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonFinite => write!(f, "non-finite samples"),
            Self::InvalidFrame {
                frame_length,
                hop_length,
            } => write!(f, "invalid framing {}/{}", frame_length, hop_length),
            Self::Fft(msg) => write!(f, "FFT failed: {}", msg),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ANALYZER
// ═══════════════════════════════════════════════════════════════════════════════

/// Spectral-feature voice activity analyzer
#[derive(Debug, Clone)]
pub struct VoiceActivityAnalyzer {
    config: VadConfig,
}

impl VoiceActivityAnalyzer {
    pub fn new(config: VadConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VadConfig {
        &self.config
    }

    /// Voiced segments plus voiced and total durations. Never fails.
    pub fn analyze(&self, buffer: &AudioBuffer) -> VoiceAnalysis {
        let total_duration = buffer.duration();
        if buffer.is_empty() {
            return VoiceAnalysis {
                segments: Vec::new(),
                voice_duration: 0.0,
                total_duration,
                fell_back: false,
            };
        }

        match self.frame_features(buffer) {
            Ok(features) => self.segments_from(&features, buffer.sample_rate, total_duration),
            Err(fault) => {
                warn!(
                    "[VAD] analysis failed ({}); treating all {:.2}s as voiced",
                    fault, total_duration
                );
                VoiceAnalysis::whole_buffer(total_duration)
            }
        }
    }

    /// Centroid, rolloff and ZCR for every hop
    pub fn frame_features(&self, buffer: &AudioBuffer) -> Result<Vec<FrameFeatures>, AnalysisFault> {
        let VadConfig {
            frame_length,
            hop_length,
            ..
        } = self.config;
        if frame_length < 2 || hop_length == 0 {
            return Err(AnalysisFault::InvalidFrame {
                frame_length,
                hop_length,
            });
        }

        let mono = FormatNormalizer::to_mono(buffer);
        if mono.samples.iter().any(|s| !s.is_finite()) {
            return Err(AnalysisFault::NonFinite);
        }

        let fft: Arc<dyn RealToComplex<f32>> =
            RealFftPlanner::<f32>::new().plan_fft_forward(frame_length);
        let window: Vec<f32> = (0..frame_length)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / frame_length as f32).cos()))
            .collect();
        let mut input = fft.make_input_vec();
        let mut spectrum = fft.make_output_vec();
        let bin_hz = mono.sample_rate as f32 / frame_length as f32;

        let samples = &mono.samples;
        let frame_count = samples.len().div_ceil(hop_length);
        let mut features = Vec::with_capacity(frame_count);

        for frame in 0..frame_count {
            let start = frame * hop_length;
            let end = (start + frame_length).min(samples.len());
            let chunk = &samples[start..end];

            for (i, slot) in input.iter_mut().enumerate() {
                *slot = chunk.get(i).copied().unwrap_or(0.0) * window[i];
            }
            fft.process(&mut input, &mut spectrum)
                .map_err(|e| AnalysisFault::Fft(e.to_string()))?;

            let magnitudes: Vec<f32> = spectrum.iter().map(|c| c.norm()).collect();
            let centroid_hz = spectral_centroid(&magnitudes, bin_hz);
            let rolloff_hz = spectral_rolloff(&magnitudes, bin_hz, self.config.rolloff_percent);
            let zero_crossing_rate = zero_crossing_rate(chunk);

            let voiced = centroid_hz / 1000.0 > self.config.voice_threshold
                && zero_crossing_rate < self.config.zcr_threshold;

            features.push(FrameFeatures {
                centroid_hz,
                rolloff_hz,
                zero_crossing_rate,
                voiced,
            });
        }

        Ok(features)
    }

    /// Merge voiced frame runs into segments and drop the short ones
    fn segments_from(&self, features: &[FrameFeatures], sample_rate: u32, total: f64) -> VoiceAnalysis {
        let hop_secs = self.config.hop_length as f64 / sample_rate as f64;
        let mut runs: Vec<(usize, usize)> = Vec::new();

        for (index, _) in features.iter().enumerate().filter(|(_, f)| f.voiced) {
            match runs.last_mut() {
                Some((_, last)) if index - *last <= 1 => *last = index,
                _ => runs.push((index, index)),
            }
        }

        let segments: Vec<VoiceSegment> = runs
            .into_iter()
            .map(|(first, last)| VoiceSegment {
                start_time: (first as f64 * hop_secs).min(total),
                end_time: ((last + 1) as f64 * hop_secs).min(total),
            })
            .filter(|s| s.duration() >= self.config.min_segment_secs && s.duration() > 0.0)
            .collect();

        let voice_duration = segments.iter().map(VoiceSegment::duration).sum();
        debug!(
            "[VAD] {} segments, {:.2}s voiced of {:.2}s",
            segments.len(),
            voice_duration,
            total
        );

        VoiceAnalysis {
            segments,
            voice_duration,
            total_duration: total,
            fell_back: false,
        }
    }
}

impl Default for VoiceActivityAnalyzer {
    fn default() -> Self {
        Self::new(VadConfig::default())
    }
}

fn spectral_centroid(magnitudes: &[f32], bin_hz: f32) -> f32 {
    let mut weighted = 0.0f64;
    let mut total = 0.0f64;
    for (i, &m) in magnitudes.iter().enumerate() {
        weighted += i as f64 * bin_hz as f64 * m as f64;
        total += m as f64;
    }
    if total > 0.0 { (weighted / total) as f32 } else { 0.0 }
}

fn spectral_rolloff(magnitudes: &[f32], bin_hz: f32, percent: f32) -> f32 {
    let total: f64 = magnitudes.iter().map(|&m| m as f64).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let threshold = total * percent as f64;
    let mut cumulative = 0.0f64;
    for (i, &m) in magnitudes.iter().enumerate() {
        cumulative += m as f64;
        if cumulative >= threshold {
            return i as f32 * bin_hz;
        }
    }
    (magnitudes.len().saturating_sub(1)) as f32 * bin_hz
}

fn zero_crossing_rate(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f32 / samples.len() as f32
}
