//! Boundary validation, run before any decoding

use std::path::{Path, PathBuf};

use crate::error::{FileValidationError, ValidationResult};

/// Extensions accepted on input, lowercase without the dot
pub const SUPPORTED_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "m4a", "ogg"];

/// Check extension, existence and size; returns the file size in bytes
pub fn validate_audio_file(path: &Path, max_size: u64) -> ValidationResult<u64> {
    validate_extension(path)?;

    let metadata = match std::fs::metadata(path) {
        Ok(m) if m.is_file() => m,
        _ => return Err(FileValidationError::NotFound(path.to_path_buf())),
    };

    let size = metadata.len();
    if size > max_size {
        return Err(FileValidationError::TooLarge {
            path: path.to_path_buf(),
            size,
            max: max_size,
        });
    }
    Ok(size)
}

pub fn validate_extension(path: &Path) -> ValidationResult<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    if SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(())
    } else {
        Err(FileValidationError::UnsupportedExtension {
            extension: if extension.is_empty() {
                "(none)".to_string()
            } else {
                format!(".{}", extension)
            },
            supported: SUPPORTED_EXTENSIONS
                .iter()
                .map(|e| format!(".{}", e))
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}

/// Batch must hold 1..=`max_files` inputs and allow at least one job in flight
pub fn validate_batch(inputs: &[PathBuf], max_files: usize, max_concurrent: usize) -> ValidationResult<()> {
    if inputs.is_empty() {
        return Err(FileValidationError::EmptyBatch);
    }
    if inputs.len() > max_files {
        return Err(FileValidationError::BatchTooLarge {
            count: inputs.len(),
            max: max_files,
        });
    }
    if max_concurrent == 0 {
        return Err(FileValidationError::InvalidConcurrency(max_concurrent));
    }
    Ok(())
}
