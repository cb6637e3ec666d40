//! Shared fixtures: WAV writers, scripted engines, counting loader

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use vp_audio::{AudioBuffer, AudioDecoder, AudioResult, VoiceActivityAnalyzer, WavEncoder};
use vp_convert::{AudioLoader, ConversionConfig, Device, FileLoader, VoiceConversionEngine};

pub const RATE: u32 = 22050;

// ═══════════════════════════════════════════════════════════════════════════════
// AUDIO FIXTURES
// ═══════════════════════════════════════════════════════════════════════════════

pub fn tone(seconds: f64) -> Vec<f32> {
    (0..(seconds * RATE as f64) as usize)
        .map(|i| 0.3 * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / RATE as f32).sin())
        .collect()
}

pub fn silence(seconds: f64) -> Vec<f32> {
    vec![0.0; (seconds * RATE as f64) as usize]
}

pub fn write_wav(dir: &Path, name: &str, samples: Vec<f32>) -> PathBuf {
    let path = dir.join(name);
    WavEncoder::write_file(&AudioBuffer::mono(samples, RATE), &path).unwrap();
    path
}

/// 2s of steady voice
pub fn speech(dir: &Path, name: &str) -> PathBuf {
    write_wav(dir, name, tone(2.0))
}

/// 0.4s of voice followed by 1.1s of silence
pub fn sparse_reference(dir: &Path, name: &str) -> PathBuf {
    let mut samples = tone(0.4);
    samples.extend(silence(1.1));
    write_wav(dir, name, samples)
}

/// Config whose scratch and output directories live under `root`
pub fn test_config(root: &Path) -> ConversionConfig {
    ConversionConfig::default()
        .with_temp_dir(root.join("scratch"))
        .with_output_dir(root.join("out"))
}

/// True when no job left anything behind in the scratch parent
pub fn scratch_is_clean(root: &Path) -> bool {
    match std::fs::read_dir(root.join("scratch")) {
        Ok(entries) => entries.count() == 0,
        Err(_) => true,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINES
// ═══════════════════════════════════════════════════════════════════════════════

/// What the engine saw of the reference file
#[derive(Debug, Clone, Copy)]
pub struct ReferenceSeen {
    pub duration: f64,
    pub voice_duration: f64,
}

/// Scripted stand-in for the neural engine.
///
/// Copies the prepared input to the output path unless told otherwise.
pub struct FakeEngine {
    pub available: bool,
    pub delay: Duration,
    /// Fail every call whose output file name contains this marker
    pub fail_marker: Option<String>,
    /// Extra delay for outputs whose file name contains the marker
    pub slow_marker: Option<(String, Duration)>,
    pub write_output: bool,
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub references: Mutex<Vec<ReferenceSeen>>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self {
            available: true,
            delay: Duration::ZERO,
            fail_marker: None,
            slow_marker: None,
            write_output: true,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            references: Mutex::new(Vec::new()),
        }
    }
}

impl FakeEngine {
    pub fn copying() -> Self {
        Self::default()
    }

    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_string()),
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            write_output: false,
            ..Self::default()
        }
    }

    pub fn silent() -> Self {
        Self {
            write_output: false,
            ..Self::default()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::default()
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl VoiceConversionEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    fn probe(&self) -> bool {
        self.available
    }

    fn convert(&self, input: &Path, reference: &Path, output: &Path, _device: Device) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = self.run(input, reference, output);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl FakeEngine {
    fn run(&self, input: &Path, reference: &Path, output: &Path) -> anyhow::Result<()> {
        let name = output
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let reference_audio = AudioDecoder::decode_file(reference)?;
        let analysis = VoiceActivityAnalyzer::default().analyze(&reference_audio);
        self.references.lock().push(ReferenceSeen {
            duration: reference_audio.duration(),
            voice_duration: analysis.voice_duration,
        });

        std::thread::sleep(self.delay);
        if let Some((marker, extra)) = &self.slow_marker {
            if name.contains(marker.as_str()) {
                std::thread::sleep(*extra);
            }
        }

        if let Some(marker) = &self.fail_marker {
            if name.contains(marker.as_str()) {
                anyhow::bail!("scripted failure for {}", name);
            }
        }

        if self.write_output {
            std::fs::copy(input, output)?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOADER
// ═══════════════════════════════════════════════════════════════════════════════

/// File loader that counts loads per path
#[derive(Default)]
pub struct CountingLoader {
    loads: Mutex<HashMap<PathBuf, usize>>,
}

impl CountingLoader {
    pub fn loads_of(&self, path: &Path) -> usize {
        self.loads.lock().get(path).copied().unwrap_or(0)
    }
}

impl AudioLoader for CountingLoader {
    fn load(&self, path: &Path) -> AudioResult<AudioBuffer> {
        *self.loads.lock().entry(path.to_path_buf()).or_insert(0) += 1;
        FileLoader.load(path)
    }
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
