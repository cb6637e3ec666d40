//! Loudness normalization with ITU-R BS.1770 integrated loudness
//!
//! Implements:
//! - K-weighting pre-filter (high shelf + high pass, any sample rate)
//! - 400ms gating blocks with 75% overlap
//! - Absolute (-70 LUFS) and relative (-10 LU) gating
//!
//! When loudness is undefined the normalizer degrades to peak normalization.
//! A hard peak ceiling is applied afterwards in every case.

use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::buffer::{db_to_linear, AudioBuffer};
use crate::config::LoudnessConfig;
use crate::format::FormatNormalizer;

/// Absolute gate (LUFS)
const ABSOLUTE_GATE_LUFS: f64 = -70.0;
/// Relative gate below the absolute-gated loudness (LU)
const RELATIVE_GATE_LU: f64 = -10.0;
/// Gating block length (seconds)
const BLOCK_SECS: f64 = 0.4;
/// Step between gating blocks (seconds)
const STEP_SECS: f64 = 0.1;

// ═══════════════════════════════════════════════════════════════════════════════
// K-WEIGHTING FILTER (ITU-R BS.1770-4)
// ═══════════════════════════════════════════════════════════════════════════════

/// One biquad section, transposed direct form II
#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: f64,
    z2: f64,
}

impl Biquad {
    fn new(b: [f64; 3], a: [f64; 2]) -> Self {
        Self {
            b0: b[0],
            b1: b[1],
            b2: b[2],
            a1: a[0],
            a2: a[1],
            z1: 0.0,
            z2: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f64) -> f64 {
        let out = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * out + self.z2;
        self.z2 = self.b2 * input - self.a2 * out;
        out
    }
}

/// K-weighting pre-filter (two stages)
/// Stage 1: high shelf (+4dB above ~1.5kHz, head modelling)
/// Stage 2: high-pass (RLB weighting, ~38Hz)
#[derive(Debug, Clone, Copy)]
struct KWeightingFilter {
    shelf: Biquad,
    high_pass: Biquad,
}

impl KWeightingFilter {
    /// Coefficients derived analytically so every sample rate is covered;
    /// at 48kHz they reproduce the BS.1770 reference table.
    fn new(sample_rate: f64) -> Self {
        use std::f64::consts::PI;

        let f0 = 1681.974450955533;
        let gain_db = 3.999843853973347;
        let q = 0.7071752369554196;
        let k = (PI * f0 / sample_rate).tan();
        let vh = 10.0_f64.powf(gain_db / 20.0);
        let vb = vh.powf(0.4996667741545416);
        let a0 = 1.0 + k / q + k * k;
        let shelf = Biquad::new(
            [
                (vh + vb * k / q + k * k) / a0,
                2.0 * (k * k - vh) / a0,
                (vh - vb * k / q + k * k) / a0,
            ],
            [2.0 * (k * k - 1.0) / a0, (1.0 - k / q + k * k) / a0],
        );

        let f0 = 38.13547087602444;
        let q = 0.5003270373238773;
        let k = (PI * f0 / sample_rate).tan();
        let a0 = 1.0 + k / q + k * k;
        let high_pass = Biquad::new(
            [1.0, -2.0, 1.0],
            [2.0 * (k * k - 1.0) / a0, (1.0 - k / q + k * k) / a0],
        );

        Self { shelf, high_pass }
    }

    #[inline]
    fn process(&mut self, input: f64) -> f64 {
        self.high_pass.process(self.shelf.process(input))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INTEGRATED LOUDNESS
// ═══════════════════════════════════════════════════════════════════════════════

/// Why integrated loudness could not be measured
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LoudnessUnavailable {
    /// Shorter than one 400ms gating block
    TooShort { duration: f64 },
    /// No block above the absolute gate (silence or near-silence)
    BelowAbsoluteGate,
    /// The signal contained NaN or infinite samples
    NonFinite,
}

impl fmt::Display for LoudnessUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { duration } => write!(
                f,
                "audio too short for gated loudness ({:.3}s < {:.1}s)",
                duration, BLOCK_SECS
            ),
            Self::BelowAbsoluteGate => write!(f, "no content above {} LUFS", ABSOLUTE_GATE_LUFS),
            Self::NonFinite => write!(f, "non-finite samples"),
        }
    }
}

/// Integrated loudness meter
pub struct LoudnessMeter;

impl LoudnessMeter {
    /// Gated integrated loudness in LUFS
    pub fn integrated(buffer: &AudioBuffer) -> Result<f64, LoudnessUnavailable> {
        if buffer.samples.iter().any(|s| !s.is_finite()) {
            return Err(LoudnessUnavailable::NonFinite);
        }

        let rate = buffer.sample_rate as f64;
        let block_len = (rate * BLOCK_SECS).round() as usize;
        let step = (rate * STEP_SECS).round() as usize;
        let frames = buffer.frames();

        if block_len == 0 || step == 0 || frames < block_len {
            return Err(LoudnessUnavailable::TooShort {
                duration: buffer.duration(),
            });
        }

        // Channel-weighted K-filtered power per frame (1.41 weight for surrounds)
        let channels = buffer.channel_count;
        let mut filters = vec![KWeightingFilter::new(rate); channels];
        let mut prefix = Vec::with_capacity(frames + 1);
        prefix.push(0.0f64);
        let mut acc = 0.0f64;
        for frame in buffer.samples.chunks_exact(channels) {
            let mut power = 0.0;
            for (ch, (&sample, filter)) in frame.iter().zip(filters.iter_mut()).enumerate() {
                let weighted = filter.process(sample as f64);
                let weight = if ch < 3 { 1.0 } else { 1.41 };
                power += weight * weighted * weighted;
            }
            acc += power;
            prefix.push(acc);
        }

        let block_powers: Vec<f64> = (0..=(frames - block_len) / step)
            .map(|i| {
                let start = i * step;
                (prefix[start + block_len] - prefix[start]) / block_len as f64
            })
            .collect();

        let abs_gated: Vec<f64> = block_powers
            .into_iter()
            .filter(|&p| power_to_lufs(p) > ABSOLUTE_GATE_LUFS)
            .collect();

        if abs_gated.is_empty() {
            return Err(LoudnessUnavailable::BelowAbsoluteGate);
        }

        let abs_loudness = power_to_lufs(mean(&abs_gated));
        let rel_threshold = abs_loudness + RELATIVE_GATE_LU;

        let rel_gated: Vec<f64> = abs_gated
            .into_iter()
            .filter(|&p| power_to_lufs(p) > rel_threshold)
            .collect();

        if rel_gated.is_empty() {
            return Err(LoudnessUnavailable::BelowAbsoluteGate);
        }

        Ok(power_to_lufs(mean(&rel_gated)))
    }
}

fn power_to_lufs(power: f64) -> f64 {
    if power > 0.0 {
        -0.691 + 10.0 * power.log10()
    } else {
        -f64::INFINITY
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

// ═══════════════════════════════════════════════════════════════════════════════
// NORMALIZER
// ═══════════════════════════════════════════════════════════════════════════════

/// How the gain was chosen
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GainStrategy {
    /// Gain computed from measured integrated loudness
    Loudness { measured_lufs: f64 },
    /// Loudness undefined, normalized by sample peak instead
    PeakFallback { reason: LoudnessUnavailable },
    /// Digital silence, left untouched
    Silent,
}

/// Result of loudness normalization
#[derive(Debug, Clone)]
pub struct LoudnessOutcome {
    pub buffer: AudioBuffer,
    pub strategy: GainStrategy,
    /// Gain applied before the peak ceiling (dB)
    pub gain_db: f64,
    /// Whether the peak ceiling had to scale the result down
    pub limited: bool,
}

/// Normalize to `target_lufs` and enforce the `peak_limit_db` ceiling.
///
/// Must run after resampling to the working rate.
pub fn normalize_loudness(buffer: &AudioBuffer, config: &LoudnessConfig) -> AudioBuffer {
    normalize_loudness_detailed(buffer, config).buffer
}

/// [`normalize_loudness`] with the chosen strategy reported
pub fn normalize_loudness_detailed(buffer: &AudioBuffer, config: &LoudnessConfig) -> LoudnessOutcome {
    let clean = FormatNormalizer::coerce(buffer);
    let peak = clean.peak() as f64;

    let (gained, strategy, gain_db) = match LoudnessMeter::integrated(&clean) {
        Ok(measured) => {
            let gain_db = config.target_lufs - measured;
            debug!(
                "[Loudness] measured {:.2} LUFS, gain {:+.2} dB -> {:.1} LUFS",
                measured, gain_db, config.target_lufs
            );
            (
                clean.with_gain(db_to_linear(gain_db) as f32),
                GainStrategy::Loudness {
                    measured_lufs: measured,
                },
                gain_db,
            )
        }
        Err(_) if peak <= 0.0 => (clean, GainStrategy::Silent, 0.0),
        Err(reason) => {
            warn!("[Loudness] {}; falling back to peak normalization", reason);
            let gain = 1.0 / peak;
            (
                clean.with_gain(gain as f32),
                GainStrategy::PeakFallback { reason },
                20.0 * gain.log10(),
            )
        }
    };

    let (buffer, limited) = apply_peak_ceiling(&gained, config.peak_limit_db);

    LoudnessOutcome {
        buffer,
        strategy,
        gain_db,
        limited,
    }
}

/// Scale uniformly so the sample peak sits at or below `limit_db`; never clips
pub fn apply_peak_ceiling(buffer: &AudioBuffer, limit_db: f64) -> (AudioBuffer, bool) {
    // A hair under the ceiling so f32 rounding cannot land above it
    let ceiling = (db_to_linear(limit_db) * (1.0 - 1e-6)) as f32;
    let peak = buffer.peak();
    if peak <= ceiling {
        return (buffer.clone(), false);
    }
    debug!(
        "[Loudness] peak {:.2} dBFS over ceiling {:.1} dBFS, scaling down",
        buffer.peak_db(),
        limit_db
    );
    (buffer.with_gain(ceiling / peak), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn sine(freq: f32, amplitude: f32, seconds: f32, rate: u32) -> AudioBuffer {
        let samples = (0..(seconds * rate as f32) as usize)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin())
            .collect();
        AudioBuffer::mono(samples, rate)
    }

    fn ceiling(config: &LoudnessConfig) -> f32 {
        db_to_linear(config.peak_limit_db) as f32
    }

    #[test]
    fn test_k_weighting_48k_matches_reference() {
        let filter = KWeightingFilter::new(48000.0);
        assert!((filter.shelf.b0 - 1.53512485958697).abs() < 1e-6);
        assert!((filter.shelf.a1 - -1.69065929318241).abs() < 1e-6);
        assert!((filter.high_pass.a1 - -1.99004745483398).abs() < 1e-6);
    }

    #[test]
    fn test_full_scale_sine_reads_minus_three() {
        // A 0 dBFS 997Hz sine reads about -3 LUFS on a mono channel
        let buffer = sine(997.0, 1.0, 2.0, 48000);
        let lufs = LoudnessMeter::integrated(&buffer).unwrap();
        assert!((lufs - -3.01).abs() < 0.2, "got {}", lufs);
    }

    #[test]
    fn test_meter_unavailable_reasons() {
        let short = sine(440.0, 0.5, 0.2, 22050);
        assert!(matches!(
            LoudnessMeter::integrated(&short),
            Err(LoudnessUnavailable::TooShort { .. })
        ));

        let silence = AudioBuffer::silence(2.0, 22050);
        assert_eq!(
            LoudnessMeter::integrated(&silence),
            Err(LoudnessUnavailable::BelowAbsoluteGate)
        );

        let mut broken = sine(440.0, 0.5, 1.0, 22050);
        broken.samples[10] = f32::NAN;
        assert_eq!(
            LoudnessMeter::integrated(&broken),
            Err(LoudnessUnavailable::NonFinite)
        );
    }

    #[test]
    fn test_normalize_reaches_target() {
        let config = LoudnessConfig::default();
        let buffer = sine(440.0, 0.05, 3.0, 22050);

        let outcome = normalize_loudness_detailed(&buffer, &config);
        assert!(matches!(outcome.strategy, GainStrategy::Loudness { .. }));
        assert!(!outcome.limited);

        let after = LoudnessMeter::integrated(&outcome.buffer).unwrap();
        assert!((after - config.target_lufs).abs() < 0.5, "got {}", after);
    }

    #[test]
    fn test_near_silence_falls_back_to_peak() {
        let config = LoudnessConfig::default();
        let buffer = sine(440.0, 1e-5, 2.0, 22050);

        let outcome = normalize_loudness_detailed(&buffer, &config);
        assert!(matches!(
            outcome.strategy,
            GainStrategy::PeakFallback {
                reason: LoudnessUnavailable::BelowAbsoluteGate
            }
        ));
        assert!(outcome.limited);
        assert!((outcome.buffer.peak() - ceiling(&config)).abs() < 1e-3);
    }

    #[test]
    fn test_digital_silence_untouched() {
        let buffer = AudioBuffer::silence(1.0, 22050);
        let outcome = normalize_loudness_detailed(&buffer, &LoudnessConfig::default());
        assert_eq!(outcome.strategy, GainStrategy::Silent);
        assert_eq!(outcome.buffer, buffer);
    }

    #[test]
    fn test_peak_ceiling_on_loud_target() {
        let config = LoudnessConfig {
            target_lufs: 0.0,
            peak_limit_db: -1.0,
        };
        let buffer = sine(440.0, 0.1, 2.0, 22050);
        let outcome = normalize_loudness_detailed(&buffer, &config);
        assert!(outcome.limited);
        assert!(outcome.buffer.peak() <= ceiling(&config));
    }

    #[test]
    fn test_peak_bound_holds_for_all_inputs() {
        let config = LoudnessConfig::default();
        let mut rng = StdRng::seed_from_u64(7);

        let clipped: Vec<f32> = (0..44100)
            .map(|i| if (i / 50) % 2 == 0 { 3.0 } else { -3.0 })
            .collect();
        let mut impulses = vec![0.001f32; 44100];
        for i in (0..44100).step_by(4410) {
            impulses[i] = 1.0;
        }
        let noise: Vec<f32> = (0..44100).map(|_| rng.random_range(-1.0..1.0)).collect();

        let inputs = vec![
            AudioBuffer::mono(clipped, 22050),
            AudioBuffer::mono(impulses, 22050),
            AudioBuffer::mono(noise, 22050),
            sine(440.0, 1e-6, 1.0, 22050),
            sine(440.0, 0.9, 0.1, 22050),
        ];

        for input in &inputs {
            let out = normalize_loudness(input, &config);
            assert!(out.peak() <= ceiling(&config), "peak {} over ceiling", out.peak());
            assert_eq!(out.frames(), input.frames());
        }
    }

    #[test]
    fn test_does_not_mutate_input() {
        let buffer = sine(440.0, 0.05, 1.0, 22050);
        let before = buffer.clone();
        let _ = normalize_loudness(&buffer, &LoudnessConfig::default());
        assert_eq!(buffer, before);
    }
}
