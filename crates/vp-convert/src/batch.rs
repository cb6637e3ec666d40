//! Batch concurrency controller
//!
//! The shared reference is loaded and prepared once. Jobs are spawned
//! together and admitted through a counting semaphore; results come back in
//! input order no matter which job finishes first. A failing job becomes a
//! `failed` entry and never touches its siblings.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use log::{error, info, warn};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::error::VpResult;
use crate::job::{BatchReport, JobResult};
use crate::orchestrator::ConversionOrchestrator;
use crate::validate::validate_batch;

/// One batch invocation
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub inputs: Vec<PathBuf>,
    pub reference: PathBuf,
    /// In-flight bound (`None` = configured default)
    pub max_concurrent: Option<usize>,
    /// Output directory (`None` = configured default)
    pub output_dir: Option<PathBuf>,
}

impl BatchRequest {
    pub fn new(inputs: Vec<PathBuf>, reference: impl Into<PathBuf>) -> Self {
        Self {
            inputs,
            reference: reference.into(),
            max_concurrent: None,
            output_dir: None,
        }
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = Some(max);
        self
    }

    pub fn with_output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.output_dir = Some(dir.into());
        self
    }
}

/// Runs batches on a shared orchestrator
pub struct BatchController {
    orchestrator: Arc<ConversionOrchestrator>,
}

impl BatchController {
    pub fn new(orchestrator: Arc<ConversionOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &Arc<ConversionOrchestrator> {
        &self.orchestrator
    }

    /// Convert every input against one reference.
    ///
    /// Errors only for problems that would fail every job the same way
    /// (bad batch shape, unusable reference, engine unavailable); everything
    /// else is reported per item.
    pub async fn run_batch(&self, request: BatchRequest) -> VpResult<BatchReport> {
        let config = self.orchestrator.config();
        let max_concurrent = request.max_concurrent.unwrap_or(config.max_concurrent);
        validate_batch(&request.inputs, config.max_batch_size, max_concurrent)?;
        self.orchestrator.ensure_engine()?;

        let batch_id = Uuid::new_v4();
        let started_at = Utc::now();
        let output_dir = request
            .output_dir
            .clone()
            .unwrap_or_else(|| config.output_dir.clone());

        info!(
            "[Batch] {} starting: {} inputs, max {} in flight",
            batch_id,
            request.inputs.len(),
            max_concurrent
        );

        let reference = self.orchestrator.prepare_reference(&request.reference).await?;
        let gate = Arc::new(Semaphore::new(max_concurrent));

        let handles: Vec<_> = request
            .inputs
            .iter()
            .enumerate()
            .map(|(index, input)| {
                let orchestrator = self.orchestrator.clone();
                let reference = reference.clone();
                let gate = gate.clone();
                let input = input.clone();
                let output = output_dir.join(BatchReport::output_file_name(&batch_id, index));

                tokio::spawn(async move {
                    let started = Instant::now();
                    let Ok(_permit) = gate.acquire_owned().await else {
                        return JobResult::failure(
                            index,
                            display_name(&input),
                            "admission gate closed".to_string(),
                            started.elapsed(),
                        );
                    };
                    info!("[Batch] {} file {} started", batch_id, index);

                    match orchestrator
                        .convert_with_reference(&input, &reference, &output)
                        .await
                    {
                        Ok(outcome) => JobResult::success(index, display_name(&input), &outcome),
                        Err(e) => {
                            warn!("[Batch] {} file {} failed: {}", batch_id, index, e);
                            JobResult::failure(index, display_name(&input), e.to_string(), started.elapsed())
                        }
                    }
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (index, handle) in handles.into_iter().enumerate() {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_error) => {
                    error!("[Batch] {} file {} worker lost: {}", batch_id, index, join_error);
                    JobResult::failure(
                        index,
                        display_name(&request.inputs[index]),
                        format!("Conversion worker lost: {}", join_error),
                        std::time::Duration::ZERO,
                    )
                }
            };
            results.push(result);
        }

        let report = BatchReport::new(batch_id, started_at, results);
        info!(
            "[Batch] {} finished: {}/{} completed, {} failed",
            batch_id, report.completed, report.total, report.failed
        );
        Ok(report)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
