//! VoxPrep audio: preparation of arbitrary user audio for voice conversion
//!
//! Turns whatever the user uploaded into audio a conversion engine handles
//! reliably:
//! - Decoding (WAV/FLAC/MP3/OGG/M4A) and 16-bit WAV encoding
//! - Format normalization (mono, fixed rate, finite f32)
//! - Loudness normalization (BS.1770 integrated loudness with peak ceiling)
//! - Heuristic voice activity analysis
//! - Duration repair (escalating trim, fades, padding, repetition)
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                       OptimizationPipeline                            │
//! │                                                                       │
//! │  ┌─────────┐  ┌──────────┐  ┌──────────┐  ┌────────┐  ┌────────────┐ │
//! │  │ Decoder │→ │ Resample │→ │ Loudness │→ │  Trim  │→ │ Fade / Pad │ │
//! │  └─────────┘  └──────────┘  └──────────┘  └────────┘  │   / Loop   │ │
//! │                                              ↑        └────────────┘ │
//! │                                   VoiceActivityAnalyzer               │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vp_audio::{AudioRole, OptimizationPipeline, PipelineConfig, WavEncoder};
//!
//! let pipeline = OptimizationPipeline::new(PipelineConfig::default())?;
//! let prepared = pipeline.prepare_file(Path::new("take.m4a"), AudioRole::Input)?;
//! WavEncoder::write_file(&prepared.buffer, Path::new("take.wav"))?;
//! ```

mod buffer;
mod config;
mod decoder;
mod duration;
mod encoder;
mod error;
mod format;
mod loudness;
mod pipeline;
mod vad;

pub use buffer::*;
pub use config::*;
pub use decoder::*;
pub use duration::*;
pub use encoder::*;
pub use error::*;
pub use format::*;
pub use loudness::*;
pub use pipeline::*;
pub use vad::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
