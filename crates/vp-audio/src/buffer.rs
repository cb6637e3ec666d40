//! In-memory waveform container

use serde::{Deserialize, Serialize};

use crate::error::{AudioError, AudioResult};

// ═══════════════════════════════════════════════════════════════════════════════
// AUDIO BUFFER
// ═══════════════════════════════════════════════════════════════════════════════

/// Interleaved f32 waveform.
///
/// Stages never edit a buffer they were handed; each returns a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Interleaved samples
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channel_count: usize,
}

impl AudioBuffer {
    /// Create a buffer, rejecting empty or malformed input
    pub fn new(samples: Vec<f32>, sample_rate: u32, channel_count: usize) -> AudioResult<Self> {
        if sample_rate == 0 {
            return Err(AudioError::InvalidConfig("sample rate must be > 0".to_string()));
        }
        if channel_count == 0 {
            return Err(AudioError::InvalidConfig("channel count must be > 0".to_string()));
        }
        if samples.is_empty() {
            return Err(AudioError::EmptyAudio);
        }
        if samples.len() % channel_count != 0 {
            return Err(AudioError::Decode(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channel_count
            )));
        }
        Ok(Self {
            samples,
            sample_rate,
            channel_count,
        })
    }

    /// Mono buffer from raw samples
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channel_count: 1,
        }
    }

    /// Mono digital silence of the given length
    pub fn silence(seconds: f64, sample_rate: u32) -> Self {
        let frames = (seconds * sample_rate as f64).round().max(0.0) as usize;
        Self::mono(vec![0.0; frames], sample_rate)
    }

    /// Number of frames
    pub fn frames(&self) -> usize {
        if self.channel_count == 0 {
            0
        } else {
            self.samples.len() / self.channel_count
        }
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.frames() as f64 / self.sample_rate as f64
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_mono(&self) -> bool {
        self.channel_count == 1
    }

    /// Frame count for a duration at this buffer's rate
    pub fn frames_for(&self, seconds: f64) -> usize {
        (seconds * self.sample_rate as f64).round().max(0.0) as usize
    }

    /// De-interleaved copy of one channel
    pub fn channel(&self, channel: usize) -> Vec<f32> {
        if channel >= self.channel_count {
            return Vec::new();
        }
        self.samples
            .iter()
            .skip(channel)
            .step_by(self.channel_count)
            .copied()
            .collect()
    }

    /// Frames `[start, end)` as a new buffer
    pub fn slice_frames(&self, start: usize, end: usize) -> AudioBuffer {
        let end = end.min(self.frames());
        let start = start.min(end);
        AudioBuffer {
            samples: self.samples[start * self.channel_count..end * self.channel_count].to_vec(),
            sample_rate: self.sample_rate,
            channel_count: self.channel_count,
        }
    }

    /// Copy with a linear gain applied
    pub fn with_gain(&self, gain: f32) -> AudioBuffer {
        AudioBuffer {
            samples: self.samples.iter().map(|s| s * gain).collect(),
            sample_rate: self.sample_rate,
            channel_count: self.channel_count,
        }
    }

    /// Peak level (linear)
    pub fn peak(&self) -> f32 {
        self.samples.iter().map(|s| s.abs()).fold(0.0, f32::max)
    }

    /// Peak level (dBFS)
    pub fn peak_db(&self) -> f64 {
        let peak = self.peak() as f64;
        if peak <= 0.0 {
            -f64::INFINITY
        } else {
            20.0 * peak.log10()
        }
    }

    /// RMS level (linear)
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum / self.samples.len() as f64).sqrt() as f32
    }

    /// Summary used for diagnostics
    pub fn info(&self) -> AudioInfo {
        AudioInfo {
            duration: self.duration(),
            sample_rate: self.sample_rate,
            channels: self.channel_count,
            frames: self.frames(),
            peak_db: self.peak_db(),
        }
    }
}

/// Audio summary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioInfo {
    pub duration: f64,
    pub sample_rate: u32,
    pub channels: usize,
    pub frames: usize,
    pub peak_db: f64,
}

/// Convert dB to linear gain
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Convert linear gain to dB
pub fn linear_to_db(linear: f64) -> f64 {
    20.0 * linear.log10()
}
