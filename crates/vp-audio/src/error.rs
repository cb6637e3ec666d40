//! Error types for audio preparation

use thiserror::Error;

/// Audio processing errors.
///
/// Every variant means the audio itself (or the parameters used to shape it)
/// is unusable; the message carries the underlying codec text where there is one.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("Failed to encode audio: {0}")]
    Encode(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Sample rate conversion failed: {0}")]
    Resample(String),

    #[error("Audio contains no samples")]
    EmptyAudio,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;

impl From<hound::Error> for AudioError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(e) => AudioError::Io(e),
            other => AudioError::Decode(other.to_string()),
        }
    }
}
