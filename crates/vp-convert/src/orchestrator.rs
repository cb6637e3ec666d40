//! Conversion orchestrator
//!
//! Runs one job through `Validating → Preparing → Converting → Verifying`.
//! Scratch files live in a per-job temporary directory that is removed when
//! the job ends, whichever way it ends.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use vp_audio::{AudioBuffer, AudioRole, OptimizationPipeline, PreparedAudio, WavEncoder};

use crate::config::ConversionConfig;
use crate::engine::{CommandEngine, EngineAvailability, VoiceConversionEngine};
use crate::error::{ConversionError, VpError, VpResult};
use crate::job::{AudioMetrics, ConversionEstimate, ConversionOutcome, ConversionStage};
use crate::loader::{AudioLoader, FileLoader};
use crate::validate::validate_audio_file;
use crate::worker::{EnginePool, EngineRequest};

/// Reference audio prepared once and shared read-only between jobs
#[derive(Debug)]
pub struct PreparedReference {
    pub source: PathBuf,
    pub source_duration: f64,
    pub prepared: PreparedAudio,
}

/// Drives single conversions; cheap to share behind an `Arc`
pub struct ConversionOrchestrator {
    config: ConversionConfig,
    pipeline: OptimizationPipeline,
    engine: Arc<dyn VoiceConversionEngine>,
    availability: Arc<EngineAvailability>,
    loader: Arc<dyn AudioLoader>,
    pool: EnginePool,
}

impl ConversionOrchestrator {
    /// Orchestrator around `engine`, probing it lazily for availability
    pub fn new(config: ConversionConfig, engine: Arc<dyn VoiceConversionEngine>) -> VpResult<Self> {
        config.validate()?;
        let pipeline = OptimizationPipeline::new(config.pipeline.clone())?;
        let pool = EnginePool::new(config.engine_workers, config.engine_timeout())?;
        Ok(Self {
            availability: Arc::new(EngineAvailability::new(engine.clone())),
            loader: Arc::new(FileLoader),
            config,
            pipeline,
            engine,
            pool,
        })
    }

    /// Orchestrator around the configured external converter program
    pub fn with_command_engine(config: ConversionConfig) -> VpResult<Self> {
        let engine = Arc::new(CommandEngine::new(config.engine.clone()));
        Self::new(config, engine)
    }

    /// Replace the capability probe
    pub fn with_availability(mut self, availability: Arc<EngineAvailability>) -> Self {
        self.availability = availability;
        self
    }

    /// Replace the audio loader
    pub fn with_loader(mut self, loader: Arc<dyn AudioLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &OptimizationPipeline {
        &self.pipeline
    }

    /// Cached engine availability
    pub fn is_engine_available(&self) -> bool {
        self.availability.is_available()
    }

    /// Fail fast with a descriptive error when the engine cannot run
    pub fn ensure_engine(&self) -> Result<(), ConversionError> {
        if self.is_engine_available() {
            Ok(())
        } else {
            Err(ConversionError::EngineUnavailable(format!(
                "'{}' could not be started; install it or point engine.program at a converter",
                self.engine.name()
            )))
        }
    }

    /// Size-based processing time estimate
    pub fn estimate(&self, input: &Path, reference: &Path) -> VpResult<ConversionEstimate> {
        let input_size = validate_audio_file(input, self.config.max_file_size)?;
        let reference_size = validate_audio_file(reference, self.config.max_file_size)?;
        Ok(ConversionEstimate::from_sizes(
            input_size,
            reference_size,
            self.config.device,
            self.is_engine_available(),
        ))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ENTRY POINTS
    // ═══════════════════════════════════════════════════════════════════════

    /// Convert `input` to the voice in `reference`, writing `output`
    pub async fn convert(&self, input: &Path, reference: &Path, output: &Path) -> VpResult<ConversionOutcome> {
        self.ensure_engine()?;
        let reference = self.prepare_reference(reference).await?;
        self.convert_with_reference(input, &reference, output).await
    }

    /// Load, check and prepare reference audio
    pub async fn prepare_reference(&self, path: &Path) -> VpResult<Arc<PreparedReference>> {
        validate_audio_file(path, self.config.max_file_size)?;
        let buffer = self.load(path).await?;

        let source_duration = buffer.duration();
        if source_duration < self.config.min_reference_secs {
            return Err(ConversionError::ReferenceTooShort {
                measured: source_duration,
                minimum: self.config.min_reference_secs,
            }
            .into());
        }

        let prepared = self.prepare(buffer, AudioRole::Reference).await?;
        info!(
            "[Convert] reference {} ready: {:.2}s, voice {:.2}s",
            path.display(),
            prepared.total_duration,
            prepared.voice_duration
        );
        Ok(Arc::new(PreparedReference {
            source: path.to_path_buf(),
            source_duration,
            prepared,
        }))
    }

    /// Convert with an already prepared reference (batch path)
    pub async fn convert_with_reference(
        &self,
        input: &Path,
        reference: &PreparedReference,
        output: &Path,
    ) -> VpResult<ConversionOutcome> {
        let started = Instant::now();
        let mut stage = ConversionStage::Validating;

        match self.run_stages(input, reference, output, &mut stage, started).await {
            Ok(outcome) => {
                debug!("[Convert] {} -> {}", input.display(), ConversionStage::Completed);
                info!(
                    "[Convert] {} -> {} in {:.2}s",
                    input.display(),
                    outcome.output_path.display(),
                    outcome.elapsed_secs
                );
                Ok(outcome)
            }
            Err(e) => {
                warn!(
                    "[Convert] {} {} while {}: {}",
                    input.display(),
                    ConversionStage::Failed,
                    stage,
                    e
                );
                Err(e)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // STAGES
    // ═══════════════════════════════════════════════════════════════════════

    async fn run_stages(
        &self,
        input: &Path,
        reference: &PreparedReference,
        output: &Path,
        stage: &mut ConversionStage,
        started: Instant,
    ) -> VpResult<ConversionOutcome> {
        // Validating
        self.ensure_engine()?;
        validate_audio_file(input, self.config.max_file_size)?;
        let buffer = self.load(input).await?;
        self.check_input(&buffer)?;

        // Preparing
        self.enter(stage, ConversionStage::Preparing, input);
        let prepared = self.prepare(buffer, AudioRole::Input).await?;

        let scratch = self.scratch_dir()?;
        let input_wav = scratch.path().join("input.wav");
        let reference_wav = scratch.path().join("reference.wav");
        WavEncoder::write_file(&prepared.buffer, &input_wav)?;
        WavEncoder::write_file(&reference.prepared.buffer, &reference_wav)?;

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(ConversionError::from)?;
        }
        // A leftover file must not pass verification for a silent engine
        match tokio::fs::remove_file(output).await {
            Ok(()) => debug!("[Convert] removed stale {}", output.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ConversionError::from(e).into()),
        }

        // Converting
        self.enter(stage, ConversionStage::Converting, input);
        let request = EngineRequest {
            input: input_wav,
            reference: reference_wav,
            output: output.to_path_buf(),
            device: self.config.device,
        };
        self.pool.run(self.engine.clone(), request).await?;

        // Verifying
        self.enter(stage, ConversionStage::Verifying, input);
        let output_size = match tokio::fs::metadata(output).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => return Err(ConversionError::MissingOutput(output.to_path_buf()).into()),
        };

        // Scratch directory is removed on every return path
        drop(scratch);

        Ok(ConversionOutcome {
            output_path: output.to_path_buf(),
            output_size,
            input: AudioMetrics::from(&prepared),
            reference: AudioMetrics::from(&reference.prepared),
            device: self.config.device,
            elapsed_secs: started.elapsed().as_secs_f64(),
        })
    }

    fn enter(&self, stage: &mut ConversionStage, next: ConversionStage, input: &Path) {
        debug!("[Convert] {}: {} -> {}", input.display(), stage, next);
        *stage = next;
    }

    /// Duration floors on the raw input
    fn check_input(&self, buffer: &AudioBuffer) -> Result<(), ConversionError> {
        let duration = buffer.duration();
        if duration < self.config.min_input_secs {
            return Err(ConversionError::InputTooShort {
                measured: duration,
                minimum: self.config.min_input_secs,
            });
        }

        let voice = self.pipeline.analyze(buffer);
        if voice.voice_duration < self.config.min_voice_secs {
            return Err(ConversionError::InsufficientVoice {
                measured: voice.voice_duration,
                minimum: self.config.min_voice_secs,
                ratio: voice.voice_ratio() * 100.0,
            });
        }
        Ok(())
    }

    fn scratch_dir(&self) -> Result<tempfile::TempDir, ConversionError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("vp-job-");
        let dir = match &self.config.temp_dir {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // BLOCKING WORK
    // ═══════════════════════════════════════════════════════════════════════

    async fn load(&self, path: &Path) -> VpResult<AudioBuffer> {
        let loader = self.loader.clone();
        let path = path.to_path_buf();
        blocking(move || loader.load(&path).map_err(VpError::from)).await
    }

    async fn prepare(&self, buffer: AudioBuffer, role: AudioRole) -> VpResult<PreparedAudio> {
        let pipeline = self.pipeline.clone();
        blocking(move || pipeline.prepare(&buffer, role).map_err(VpError::from)).await
    }
}

/// Decode and DSP stay off the async executor threads
async fn blocking<T, F>(work: F) -> VpResult<T>
where
    F: FnOnce() -> VpResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ConversionError::WorkerLost(e.to_string()))?
}
