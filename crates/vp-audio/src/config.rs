//! Configuration types for audio preparation

use serde::{Deserialize, Serialize};

use crate::error::{AudioError, AudioResult};

/// Upper bound on trim escalations before the original audio is kept
pub const MAX_TRIM_ESCALATIONS: usize = 2;

/// Optimization pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sample rate every prepared buffer is converted to
    pub target_sample_rate: u32,

    /// Run loudness normalization
    pub normalize: bool,

    /// Loudness gain staging
    pub loudness: LoudnessConfig,

    /// Voice activity heuristics
    pub vad: VadConfig,

    /// Escalating trim policy
    pub trim: TrimPolicy,

    /// Fade-in/fade-out length applied after trimming (seconds)
    pub fade_secs: f64,

    /// Minimum total duration every prepared buffer is padded to (seconds)
    pub engine_min_duration_secs: f64,

    /// Minimum voiced content for reference audio, reached by repetition (seconds)
    pub reference_min_voice_secs: f64,

    /// Longest reference repetition may produce (seconds)
    pub reference_max_secs: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 22050,
            normalize: true,
            loudness: LoudnessConfig::default(),
            vad: VadConfig::default(),
            trim: TrimPolicy::default(),
            fade_secs: 0.05,
            engine_min_duration_secs: 6.0,
            reference_min_voice_secs: 7.0,
            reference_max_secs: 300.0,
        }
    }
}

impl PipelineConfig {
    /// Set target sample rate
    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.target_sample_rate = rate;
        self
    }

    /// Enable or disable loudness normalization
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Set trim policy
    pub fn with_trim(mut self, trim: TrimPolicy) -> Self {
        self.trim = trim;
        self
    }

    /// Check every tunable is inside its contract
    pub fn validate(&self) -> AudioResult<()> {
        if self.target_sample_rate == 0 {
            return Err(AudioError::InvalidConfig(
                "target_sample_rate must be > 0".to_string(),
            ));
        }
        if self.fade_secs < 0.0 {
            return Err(AudioError::InvalidConfig("fade_secs must be >= 0".to_string()));
        }
        if self.engine_min_duration_secs < 0.0 || self.reference_min_voice_secs < 0.0 {
            return Err(AudioError::InvalidConfig(
                "minimum durations must be >= 0".to_string(),
            ));
        }
        if !self.reference_max_secs.is_finite() || self.reference_max_secs < self.reference_min_voice_secs {
            return Err(AudioError::InvalidConfig(format!(
                "reference_max_secs must be finite and >= reference_min_voice_secs, got {}",
                self.reference_max_secs
            )));
        }
        self.loudness.validate()?;
        self.vad.validate()?;
        self.trim.validate()
    }
}

/// Loudness normalization targets
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoudnessConfig {
    /// Integrated loudness target (LUFS)
    pub target_lufs: f64,
    /// Hard peak ceiling after gain (dBFS)
    pub peak_limit_db: f64,
}

impl Default for LoudnessConfig {
    fn default() -> Self {
        Self {
            target_lufs: -16.0,
            peak_limit_db: -1.0,
        }
    }
}

impl LoudnessConfig {
    fn validate(&self) -> AudioResult<()> {
        if !self.target_lufs.is_finite() || self.target_lufs > 0.0 {
            return Err(AudioError::InvalidConfig(format!(
                "target_lufs must be a finite value <= 0, got {}",
                self.target_lufs
            )));
        }
        if !self.peak_limit_db.is_finite() || self.peak_limit_db > 0.0 {
            return Err(AudioError::InvalidConfig(format!(
                "peak_limit_db must be a finite value <= 0, got {}",
                self.peak_limit_db
            )));
        }
        Ok(())
    }
}

/// Heuristic voice activity parameters.
///
/// The thresholds are uncalibrated defaults and need empirical tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    /// Analysis window (samples, power of two)
    pub frame_length: usize,
    /// Hop between frames (samples)
    pub hop_length: usize,
    /// Spectral centroid a frame must exceed to count as voiced (kHz)
    pub voice_threshold: f32,
    /// Zero-crossing rate a frame must stay under to count as voiced (crossings per sample)
    pub zcr_threshold: f32,
    /// Energy fraction below the rolloff frequency
    pub rolloff_percent: f32,
    /// Segments shorter than this are discarded as noise (seconds)
    pub min_segment_secs: f64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            frame_length: 2048,
            hop_length: 512,
            voice_threshold: 0.1,
            zcr_threshold: 0.1,
            rolloff_percent: 0.85,
            min_segment_secs: 0.1,
        }
    }
}

impl VadConfig {
    fn validate(&self) -> AudioResult<()> {
        if self.frame_length == 0 || self.hop_length == 0 {
            return Err(AudioError::InvalidConfig(
                "VAD frame and hop length must be > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.rolloff_percent) {
            return Err(AudioError::InvalidConfig(
                "rolloff_percent must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Escalating silence-trim policy.
///
/// Cutoffs are empirical; keep them overridable rather than re-derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimPolicy {
    /// Inputs at or below this duration are never trimmed (seconds)
    pub skip_at_or_below_secs: f64,
    /// First, most aggressive threshold (dB below peak)
    pub initial_top_db: f32,
    /// Progressively more lenient thresholds tried when a result is too short
    pub escalation_top_db: Vec<f32>,
    /// A trim result shorter than this triggers the next escalation (seconds)
    pub safety_floor_secs: f64,
    /// After the last escalation, results shorter than this are discarded (seconds)
    pub absolute_floor_secs: f64,
    /// RMS window used for silence detection (samples)
    pub frame_length: usize,
    /// Hop between RMS windows (samples)
    pub hop_length: usize,
}

impl Default for TrimPolicy {
    fn default() -> Self {
        Self {
            skip_at_or_below_secs: 8.0,
            initial_top_db: 30.0,
            escalation_top_db: vec![40.0],
            safety_floor_secs: 4.0,
            absolute_floor_secs: 3.0,
            frame_length: 2048,
            hop_length: 512,
        }
    }
}

impl TrimPolicy {
    /// Policy that never trims
    pub fn disabled() -> Self {
        Self {
            skip_at_or_below_secs: f64::INFINITY,
            ..Default::default()
        }
    }

    fn validate(&self) -> AudioResult<()> {
        if self.escalation_top_db.len() > MAX_TRIM_ESCALATIONS {
            return Err(AudioError::InvalidConfig(format!(
                "at most {} trim escalations are allowed, got {}",
                MAX_TRIM_ESCALATIONS,
                self.escalation_top_db.len()
            )));
        }
        if self.initial_top_db <= 0.0 || self.escalation_top_db.iter().any(|&db| db <= 0.0) {
            return Err(AudioError::InvalidConfig(
                "trim thresholds must be > 0 dB".to_string(),
            ));
        }
        if self.absolute_floor_secs > self.safety_floor_secs {
            return Err(AudioError::InvalidConfig(
                "absolute_floor_secs must not exceed safety_floor_secs".to_string(),
            ));
        }
        if self.frame_length == 0 || self.hop_length == 0 {
            return Err(AudioError::InvalidConfig(
                "trim frame and hop length must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
