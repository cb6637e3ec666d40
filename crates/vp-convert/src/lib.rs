//! VoxPrep conversion: orchestration around a voice conversion engine
//!
//! Takes user audio plus a target-speaker reference, prepares both with
//! [`vp_audio::OptimizationPipeline`], hands them to an opaque engine and
//! verifies what comes back.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐     ┌──────────────────────────┐     ┌──────────────┐
//! │ BatchController│ ──→ │  ConversionOrchestrator  │ ──→ │  EnginePool  │
//! │  (semaphore)  │     │ validate → prepare →     │     │ (rayon, 2)   │
//! └───────────────┘     │ convert → verify         │     └──────┬───────┘
//!                       └──────────────────────────┘            ↓
//!                                                     VoiceConversionEngine
//! ```
//!
//! One shared reference per batch, bounded concurrency, per-job failure
//! isolation, scratch files removed on every exit path.

pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod loader;
pub mod orchestrator;
pub mod validate;
pub mod worker;

pub use batch::*;
pub use config::*;
pub use engine::*;
pub use error::*;
pub use job::*;
pub use loader::*;
pub use orchestrator::*;
pub use validate::*;
pub use worker::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
