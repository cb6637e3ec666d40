//! Voice conversion engine seam
//!
//! The engine is a black box: it reads two WAV files and writes one. It is
//! blocking and may be slow, so the orchestrator only ever calls it from the
//! engine worker pool.

use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;

use anyhow::{bail, Context};
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::config::{Device, EngineCommandConfig};

/// Neural tone-color transfer engine
pub trait VoiceConversionEngine: Send + Sync {
    /// Display name for logs
    fn name(&self) -> &str;

    /// Whether the engine can run in this process. May be expensive.
    fn probe(&self) -> bool;

    /// Convert `input` to the voice of `reference`, writing `output`
    fn convert(&self, input: &Path, reference: &Path, output: &Path, device: Device) -> anyhow::Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMMAND ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Engine backed by an external converter program
#[derive(Debug, Clone)]
pub struct CommandEngine {
    config: EngineCommandConfig,
}

impl CommandEngine {
    pub fn new(config: EngineCommandConfig) -> Self {
        Self { config }
    }

    /// Argument list with placeholders substituted
    pub fn render_args(&self, input: &Path, reference: &Path, output: &Path, device: Device) -> Vec<String> {
        self.config
            .args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input.to_string_lossy())
                    .replace("{reference}", &reference.to_string_lossy())
                    .replace("{output}", &output.to_string_lossy())
                    .replace("{device}", device.as_str())
            })
            .collect()
    }
}

impl Default for CommandEngine {
    fn default() -> Self {
        Self::new(EngineCommandConfig::default())
    }
}

impl VoiceConversionEngine for CommandEngine {
    fn name(&self) -> &str {
        &self.config.program
    }

    fn probe(&self) -> bool {
        match Command::new(&self.config.program)
            .arg("--help")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) => status.success(),
            Err(e) => {
                debug!("[Engine] cannot spawn {}: {}", self.config.program, e);
                false
            }
        }
    }

    fn convert(&self, input: &Path, reference: &Path, output: &Path, device: Device) -> anyhow::Result<()> {
        let args = self.render_args(input, reference, output, device);
        debug!("[Engine] {} {}", self.config.program, args.join(" "));

        let result = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to start {}", self.config.program))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            bail!(
                "{} exited with {}: {}",
                self.config.program,
                result.status,
                tail.join(" | ")
            );
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AVAILABILITY PROBE
// ═══════════════════════════════════════════════════════════════════════════════

/// Engine capability probe, run once and cached.
///
/// Built at startup and handed to the orchestrator; tests pass a fixed answer.
pub struct EngineAvailability {
    engine: Option<Arc<dyn VoiceConversionEngine>>,
    cached: Mutex<Option<bool>>,
}

impl EngineAvailability {
    /// Probe `engine` lazily on first query
    pub fn new(engine: Arc<dyn VoiceConversionEngine>) -> Self {
        Self {
            engine: Some(engine),
            cached: Mutex::new(None),
        }
    }

    /// Predetermined answer, the engine is never probed
    pub fn fixed(available: bool) -> Self {
        Self {
            engine: None,
            cached: Mutex::new(Some(available)),
        }
    }

    pub fn is_available(&self) -> bool {
        let mut cached = self.cached.lock();
        if let Some(available) = *cached {
            return available;
        }

        let available = self.engine.as_ref().is_some_and(|engine| {
            let ok = engine.probe();
            if ok {
                info!("[Engine] {} is available", engine.name());
            } else {
                warn!("[Engine] {} is not available", engine.name());
            }
            ok
        });
        *cached = Some(available);
        available
    }

    /// Name of the probed engine, if any
    pub fn engine_name(&self) -> Option<&str> {
        self.engine.as_ref().map(|e| e.name())
    }
}
