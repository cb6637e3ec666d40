//! Conversion configuration

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vp_audio::PipelineConfig;

use crate::error::{FileValidationError, VpError, VpResult};

/// 50 MiB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Processing device handed to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    #[serde(alias = "gpu")]
    Cuda,
}

impl Default for Device {
    fn default() -> Self {
        Self::Cpu
    }
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Device {
    type Err = FileValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            _ => Err(FileValidationError::InvalidDevice(s.to_string())),
        }
    }
}

/// External converter invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineCommandConfig {
    /// Program to run
    pub program: String,
    /// Arguments; `{input}`, `{reference}`, `{output}`, `{device}` are substituted
    pub args: Vec<String>,
}

impl Default for EngineCommandConfig {
    fn default() -> Self {
        Self {
            program: "openvoice_cli".to_string(),
            args: [
                "tune_one",
                "--input_file",
                "{input}",
                "--ref_file",
                "{reference}",
                "--output_file",
                "{output}",
                "--device",
                "{device}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Orchestrator and batch configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Audio preparation
    pub pipeline: PipelineConfig,

    /// Input shorter than this is rejected (seconds)
    pub min_input_secs: f64,
    /// Input with less detected voice than this is rejected (seconds)
    pub min_voice_secs: f64,
    /// Reference shorter than this is rejected (seconds)
    pub min_reference_secs: f64,

    pub device: Device,

    /// Parent for per-job scratch directories (`None` = system temp)
    pub temp_dir: Option<PathBuf>,
    /// Where batch outputs are written
    pub output_dir: PathBuf,

    /// Engine worker threads
    pub engine_workers: usize,
    /// Engine call time limit in seconds (`None` = unbounded)
    pub engine_timeout_secs: Option<f64>,

    /// Default in-flight bound for batches
    pub max_concurrent: usize,
    /// Largest accepted batch
    pub max_batch_size: usize,
    /// Largest accepted input file (bytes)
    pub max_file_size: u64,

    pub engine: EngineCommandConfig,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            min_input_secs: 1.0,
            min_voice_secs: 0.5,
            min_reference_secs: 0.5,
            device: Device::Cpu,
            temp_dir: None,
            output_dir: PathBuf::from("outputs"),
            engine_workers: 2,
            engine_timeout_secs: Some(600.0),
            max_concurrent: 3,
            max_batch_size: 20,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            engine: EngineCommandConfig::default(),
        }
    }
}

impl ConversionConfig {
    /// Read a JSON config; absent keys keep their defaults
    pub fn load(path: &Path) -> VpResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| VpError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| VpError::Config(format!("cannot parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_temp_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn with_output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    pub fn with_engine_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.engine_timeout_secs = timeout.map(|t| t.as_secs_f64());
        self
    }

    pub fn engine_timeout(&self) -> Option<Duration> {
        self.engine_timeout_secs
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(Duration::from_secs_f64)
    }

    pub fn validate(&self) -> VpResult<()> {
        self.pipeline.validate()?;

        for (name, value) in [
            ("min_input_secs", self.min_input_secs),
            ("min_voice_secs", self.min_voice_secs),
            ("min_reference_secs", self.min_reference_secs),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(VpError::Config(format!("{} must be > 0, got {}", name, value)));
            }
        }
        if self.engine_workers == 0 {
            return Err(VpError::Config("engine_workers must be > 0".to_string()));
        }
        if let Some(secs) = self.engine_timeout_secs {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(VpError::Config(format!(
                    "engine_timeout_secs must be > 0, got {}",
                    secs
                )));
            }
        }
        if self.max_concurrent == 0 {
            return Err(FileValidationError::InvalidConcurrency(0).into());
        }
        if self.max_batch_size == 0 {
            return Err(VpError::Config("max_batch_size must be > 0".to_string()));
        }
        if self.engine.program.trim().is_empty() {
            return Err(VpError::Config("engine.program must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ConversionConfig::default();
        assert_eq!(config.min_input_secs, 1.0);
        assert_eq!(config.min_voice_secs, 0.5);
        assert_eq!(config.min_reference_secs, 0.5);
        assert_eq!(config.engine_workers, 2);
        assert_eq!(config.max_batch_size, 20);
        assert_eq!(config.max_file_size, 50 * 1024 * 1024);
        assert_eq!(config.pipeline.target_sample_rate, 22050);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_device_parsing() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("CUDA".parse::<Device>().unwrap(), Device::Cuda);
        assert_eq!("gpu".parse::<Device>().unwrap(), Device::Cuda);
        assert!(matches!(
            "tpu".parse::<Device>(),
            Err(FileValidationError::InvalidDevice(_))
        ));
        assert_eq!(Device::Cuda.to_string(), "cuda");
    }

    #[test]
    fn test_load_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voxprep.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{ "device": "gpu", "max_concurrent": 5, "pipeline": {{ "normalize": false }} }}"#
        )
        .unwrap();

        let config = ConversionConfig::load(&path).unwrap();
        assert_eq!(config.device, Device::Cuda);
        assert_eq!(config.max_concurrent, 5);
        assert!(!config.pipeline.normalize);
        assert_eq!(config.pipeline.target_sample_rate, 22050);
        assert_eq!(config.engine, EngineCommandConfig::default());
    }

    #[test]
    fn test_load_rejects_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "max_concurrent": 0 }"#).unwrap();
        assert!(matches!(
            ConversionConfig::load(&path),
            Err(VpError::Validation(FileValidationError::InvalidConcurrency(0)))
        ));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(ConversionConfig::load(&path), Err(VpError::Config(_))));
    }

    #[test]
    fn test_engine_timeout() {
        let config = ConversionConfig::default().with_engine_timeout(Some(Duration::from_millis(250)));
        assert_eq!(config.engine_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(
            ConversionConfig::default().with_engine_timeout(None).engine_timeout(),
            None
        );
    }
}
