//! Optimization pipeline
//!
//! Fixed stage order, each stage feeding the next:
//! 1. Resample to the target rate
//! 2. Loudness-normalize (optional)
//! 3. Mono down-mix
//! 4. Escalating silence trim (skipped for short input)
//! 5. Edge fades
//! 6. Reference only: repeat until the voiced-content floor is met
//! 7. Pad to the engine's minimum duration
//!
//! Non-finite samples are zeroed before stage 1 so the resampler and the
//! loudness meter only ever see finite input. Resampling always precedes
//! loudness measurement; the order is not configurable.
//!
//! Repetition runs before padding: only trimmed, faded content is tiled,
//! so padding silence is never multiplied and never counted as voice.
//! Padding runs last so the engine minimum holds for both roles.

use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::buffer::AudioBuffer;
use crate::config::PipelineConfig;
use crate::decoder::AudioDecoder;
use crate::duration::{fade_edges, loop_to_voice_minimum, pad_to_minimum, trim_with_policy, TrimDecision};
use crate::error::{AudioError, AudioResult};
use crate::format::FormatNormalizer;
use crate::loudness::{normalize_loudness_detailed, GainStrategy};
use crate::vad::{VoiceActivityAnalyzer, VoiceAnalysis};

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT
// ═══════════════════════════════════════════════════════════════════════════════

/// Which side of a conversion the audio is prepared for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioRole {
    /// Content to convert
    Input,
    /// Target speaker sample; gets the voiced-content floor
    Reference,
}

impl Default for AudioRole {
    fn default() -> Self {
        Self::Input
    }
}

/// What each stage did, for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparationReport {
    pub role: AudioRole,
    pub original_duration: f64,
    pub original_sample_rate: u32,
    pub original_channels: usize,
    /// `None` when normalization is disabled
    pub loudness: Option<GainStrategy>,
    pub peak_limited: bool,
    pub trim: TrimDecision,
    /// Whole-buffer repetitions applied (1 = none)
    pub repeats: usize,
    /// Trailing silence appended (seconds)
    pub padded_secs: f64,
}

/// Pipeline output: the prepared buffer plus derived metrics
#[derive(Debug, Clone)]
pub struct PreparedAudio {
    pub buffer: AudioBuffer,
    pub total_duration: f64,
    pub voice_duration: f64,
    pub voice_ratio: f64,
    pub report: PreparationReport,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PIPELINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Optimization pipeline; immutable once built and shareable across threads
#[derive(Debug, Clone)]
pub struct OptimizationPipeline {
    config: PipelineConfig,
    analyzer: VoiceActivityAnalyzer,
}

impl OptimizationPipeline {
    /// Create pipeline, rejecting out-of-contract configuration
    pub fn new(config: PipelineConfig) -> AudioResult<Self> {
        config.validate()?;
        Ok(Self {
            analyzer: VoiceActivityAnalyzer::new(config.vad),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Voice activity on an arbitrary buffer with the configured heuristics
    pub fn analyze(&self, buffer: &AudioBuffer) -> VoiceAnalysis {
        self.analyzer.analyze(buffer)
    }

    /// Decode and prepare a file
    pub fn prepare_file(&self, path: &Path, role: AudioRole) -> AudioResult<PreparedAudio> {
        let buffer = AudioDecoder::decode_file(path)?;
        self.prepare(&buffer, role)
    }

    /// Run every stage on a copy of `buffer`
    pub fn prepare(&self, buffer: &AudioBuffer, role: AudioRole) -> AudioResult<PreparedAudio> {
        if buffer.is_empty() {
            return Err(AudioError::EmptyAudio);
        }
        let config = &self.config;
        let original_duration = buffer.duration();

        // 1. Resample
        let coerced = FormatNormalizer::coerce(buffer);
        let resampled = FormatNormalizer::resample(&coerced, config.target_sample_rate)?;

        // 2. Loudness
        let (leveled, loudness, peak_limited) = if config.normalize {
            let outcome = normalize_loudness_detailed(&resampled, &config.loudness);
            (outcome.buffer, Some(outcome.strategy), outcome.limited)
        } else {
            (resampled, None, false)
        };

        // 3. Down-mix
        let mono = FormatNormalizer::to_mono(&leveled);

        // 4. Trim
        let (trimmed, trim) = trim_with_policy(&mono, &config.trim);

        // 5. Fade
        let faded = fade_edges(&trimmed, config.fade_secs);

        // 6. Voiced-content floor
        let (looped, repeats) = match role {
            AudioRole::Reference => {
                loop_to_voice_minimum(
                    &faded,
                    config.reference_min_voice_secs,
                    config.reference_max_secs,
                    |candidate| self.analyzer.analyze(candidate).voice_duration,
                )
            }
            AudioRole::Input => (faded, 1),
        };

        // 7. Pad
        let before_pad = looped.duration();
        let prepared = pad_to_minimum(&looped, config.engine_min_duration_secs);
        let padded_secs = prepared.duration() - before_pad;

        let voice = self.analyzer.analyze(&prepared);
        let report = PreparationReport {
            role,
            original_duration,
            original_sample_rate: buffer.sample_rate,
            original_channels: buffer.channel_count,
            loudness,
            peak_limited,
            trim,
            repeats,
            padded_secs,
        };

        info!(
            "[Pipeline] {:?}: {:.2}s -> {:.2}s, voice {:.2}s ({:.0}%)",
            role,
            original_duration,
            voice.total_duration,
            voice.voice_duration,
            voice.voice_ratio() * 100.0
        );
        debug!("[Pipeline] {:?}", report);

        Ok(PreparedAudio {
            total_duration: voice.total_duration,
            voice_duration: voice.voice_duration,
            voice_ratio: voice.voice_ratio(),
            buffer: prepared,
            report,
        })
    }
}

impl Default for OptimizationPipeline {
    fn default() -> Self {
        Self {
            config: PipelineConfig::default(),
            analyzer: VoiceActivityAnalyzer::default(),
        }
    }
}
