//! Conversion job model: stages, per-job results, batch reports

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vp_audio::PreparedAudio;

use crate::config::Device;

/// Per-job state machine.
///
/// `Validating → Preparing → Converting → Verifying → {Completed | Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionStage {
    Validating,
    Preparing,
    Converting,
    Verifying,
    Completed,
    Failed,
}

impl fmt::Display for ConversionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validating => "validating",
            Self::Preparing => "preparing",
            Self::Converting => "converting",
            Self::Verifying => "verifying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Job execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Completed successfully
    Completed,
    /// Failed with error
    Failed,
}

/// Duration metrics of one prepared buffer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioMetrics {
    pub total_duration: f64,
    pub voice_duration: f64,
    pub voice_ratio: f64,
}

impl From<&PreparedAudio> for AudioMetrics {
    fn from(prepared: &PreparedAudio) -> Self {
        Self {
            total_duration: prepared.total_duration,
            voice_duration: prepared.voice_duration,
            voice_ratio: prepared.voice_ratio,
        }
    }
}

/// Successful single conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutcome {
    pub output_path: PathBuf,
    /// Output file size in bytes
    pub output_size: u64,
    pub input: AudioMetrics,
    pub reference: AudioMetrics,
    pub device: Device,
    pub elapsed_secs: f64,
}

/// Rough cost of a conversion before running it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionEstimate {
    pub input_size: u64,
    pub reference_size: u64,
    pub estimated_seconds: f64,
    pub device: Device,
    pub engine_available: bool,
}

impl ConversionEstimate {
    /// Seconds of engine time per MiB of input + reference
    pub const SECS_PER_MIB: f64 = 2.0;
    /// Lower bound on any estimate
    pub const MIN_SECS: f64 = 10.0;

    pub fn from_sizes(input_size: u64, reference_size: u64, device: Device, engine_available: bool) -> Self {
        let mib = (input_size + reference_size) as f64 / (1024.0 * 1024.0);
        Self {
            input_size,
            reference_size,
            estimated_seconds: (mib * Self::SECS_PER_MIB).max(Self::MIN_SECS),
            device,
            engine_available,
        }
    }
}

/// Outcome of one batch item; `results[i]` always belongs to input `i`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub index: usize,
    pub input_name: String,
    pub status: JobStatus,
    /// Output file path (if successful)
    pub output_path: Option<PathBuf>,
    /// Output file size in bytes
    pub output_size: u64,
    /// Error message (if failed)
    pub error: Option<String>,
    pub elapsed_secs: f64,
}

impl JobResult {
    /// Create successful result
    pub fn success(index: usize, input_name: String, outcome: &ConversionOutcome) -> Self {
        Self {
            index,
            input_name,
            status: JobStatus::Completed,
            output_path: Some(outcome.output_path.clone()),
            output_size: outcome.output_size,
            error: None,
            elapsed_secs: outcome.elapsed_secs,
        }
    }

    /// Create failed result
    pub fn failure(index: usize, input_name: String, error: String, elapsed: Duration) -> Self {
        Self {
            index,
            input_name,
            status: JobStatus::Failed,
            output_path: None,
            output_size: 0,
            error: Some(error),
            elapsed_secs: elapsed.as_secs_f64(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Completed
    }
}

/// Whole-batch summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub results: Vec<JobResult>,
}

impl BatchReport {
    pub fn new(batch_id: Uuid, started_at: DateTime<Utc>, results: Vec<JobResult>) -> Self {
        let completed = results.iter().filter(|r| r.is_success()).count();
        Self {
            batch_id,
            started_at,
            finished_at: Utc::now(),
            total: results.len(),
            completed,
            failed: results.len() - completed,
            results,
        }
    }

    /// Output file name for input `index`
    pub fn output_file_name(batch_id: &Uuid, index: usize) -> String {
        format!("batch_{}_file_{}.wav", batch_id, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate() {
        let small = ConversionEstimate::from_sizes(1024, 1024, Device::Cpu, true);
        assert_eq!(small.estimated_seconds, 10.0);

        let large = ConversionEstimate::from_sizes(8 * 1024 * 1024, 2 * 1024 * 1024, Device::Cuda, false);
        assert_eq!(large.estimated_seconds, 20.0);
        assert!(!large.engine_available);
    }

    #[test]
    fn test_report_counts() {
        let ok = ConversionOutcome {
            output_path: PathBuf::from("out/a.wav"),
            output_size: 100,
            input: AudioMetrics {
                total_duration: 6.0,
                voice_duration: 2.0,
                voice_ratio: 0.33,
            },
            reference: AudioMetrics {
                total_duration: 7.0,
                voice_duration: 7.0,
                voice_ratio: 1.0,
            },
            device: Device::Cpu,
            elapsed_secs: 1.5,
        };
        let results = vec![
            JobResult::success(0, "a.wav".into(), &ok),
            JobResult::failure(1, "b.wav".into(), "boom".into(), Duration::from_millis(10)),
        ];
        let report = BatchReport::new(Uuid::new_v4(), Utc::now(), results);
        assert_eq!(report.total, 2);
        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 1);
        assert!(report.finished_at >= report.started_at);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["results"][1]["status"], "failed");
        assert_eq!(json["results"][0]["status"], "completed");
    }

    #[test]
    fn test_output_file_name() {
        let id = Uuid::nil();
        assert_eq!(
            BatchReport::output_file_name(&id, 3),
            "batch_00000000-0000-0000-0000-000000000000_file_3.wav"
        );
    }
}
