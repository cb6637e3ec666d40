//! Audio loading seam

use std::path::Path;

use vp_audio::{AudioBuffer, AudioDecoder, AudioResult};

/// Source of decoded audio for the orchestrator
pub trait AudioLoader: Send + Sync {
    fn load(&self, path: &Path) -> AudioResult<AudioBuffer>;
}

/// Decodes from the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl AudioLoader for FileLoader {
    fn load(&self, path: &Path) -> AudioResult<AudioBuffer> {
        AudioDecoder::decode_file(path)
    }
}
