//! Error taxonomy for conversion orchestration
//!
//! Three kinds, one enum each:
//! - [`AudioError`]: the audio itself is unusable (decode, resample, encode)
//! - [`FileValidationError`]: caller-supplied parameters out of contract,
//!   raised before any processing
//! - [`ConversionError`]: everything inside the orchestration state machine

use std::path::PathBuf;

use thiserror::Error;
use vp_audio::AudioError;

/// Boundary validation failures
#[derive(Error, Debug)]
pub enum FileValidationError {
    #[error("File too large: {path} is {size} bytes (maximum {max} bytes)")]
    TooLarge { path: PathBuf, size: u64, max: u64 },

    #[error("Unsupported file format: {extension}. Supported formats: {supported}")]
    UnsupportedExtension { extension: String, supported: String },

    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Device must be 'cpu' or 'cuda', got '{0}'")]
    InvalidDevice(String),

    #[error("No files provided")]
    EmptyBatch,

    #[error("Too many files: {count} (maximum {max} files per batch)")]
    BatchTooLarge { count: usize, max: usize },

    #[error("max_concurrent must be at least 1, got {0}")]
    InvalidConcurrency(usize),
}

/// Orchestration failures; every message states measured vs required values
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Voice conversion engine is not available: {0}")]
    EngineUnavailable(String),

    #[error("Input audio too short: {measured:.2}s (minimum {minimum:.1}s)")]
    InputTooShort { measured: f64, minimum: f64 },

    #[error(
        "Not enough speech in input: {measured:.2}s of voice ({ratio:.0}% of the audio), minimum {minimum:.1}s"
    )]
    InsufficientVoice { measured: f64, minimum: f64, ratio: f64 },

    #[error("Reference audio too short: {measured:.2}s (minimum {minimum:.1}s)")]
    ReferenceTooShort { measured: f64, minimum: f64 },

    #[error("Voice conversion failed: no output file generated at {0}")]
    MissingOutput(PathBuf),

    #[error("Voice conversion failed: {0}")]
    Engine(String),

    #[error("Voice conversion timed out after {0:.1}s")]
    Timeout(f64),

    #[error("Conversion worker lost: {0}")]
    WorkerLost(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Any failure surfaced by this crate
#[derive(Error, Debug)]
pub enum VpError {
    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Validation(#[from] FileValidationError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl VpError {
    /// Short kind label used in reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Audio(_) => "audio_processing",
            Self::Validation(_) => "file_validation",
            Self::Conversion(_) => "conversion",
            Self::Config(_) => "config",
        }
    }
}

pub type ValidationResult<T> = Result<T, FileValidationError>;
pub type ConversionResult<T> = Result<T, ConversionError>;
pub type VpResult<T> = Result<T, VpError>;
