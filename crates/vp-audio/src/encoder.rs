//! Audio encoding module
//!
//! The canonical exchange format with the conversion engine is WAV,
//! 16-bit PCM, written with hound.

use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::Path;

use log::debug;

use crate::buffer::AudioBuffer;
use crate::error::{AudioError, AudioResult};

/// WAV encoder (16-bit PCM)
pub struct WavEncoder;

impl WavEncoder {
    pub const BITS_PER_SAMPLE: u16 = 16;

    /// Encode buffer to WAV bytes
    pub fn encode_bytes(buffer: &AudioBuffer) -> AudioResult<Vec<u8>> {
        let mut output = Vec::new();
        Self::write(buffer, Cursor::new(&mut output))?;
        Ok(output)
    }

    /// Encode buffer to a WAV file, creating parent directories as needed
    pub fn write_file(buffer: &AudioBuffer, path: &Path) -> AudioResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = BufWriter::new(File::create(path)?);
        Self::write(buffer, file)?;
        debug!(
            "[Encoder] wrote {} ({:.2}s @ {}Hz)",
            path.display(),
            buffer.duration(),
            buffer.sample_rate
        );
        Ok(())
    }

    fn write<W: Write + Seek>(buffer: &AudioBuffer, sink: W) -> AudioResult<()> {
        if buffer.is_empty() {
            return Err(AudioError::EmptyAudio);
        }

        let spec = hound::WavSpec {
            channels: buffer.channel_count as u16,
            sample_rate: buffer.sample_rate,
            bits_per_sample: Self::BITS_PER_SAMPLE,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer =
            hound::WavWriter::new(sink, spec).map_err(|e| AudioError::Encode(e.to_string()))?;

        for &sample in &buffer.samples {
            writer
                .write_sample(to_pcm16(sample))
                .map_err(|e| AudioError::Encode(e.to_string()))?;
        }

        writer
            .finalize()
            .map_err(|e| AudioError::Encode(e.to_string()))
    }
}

/// Float sample to 16-bit PCM; non-finite input becomes silence
#[inline]
fn to_pcm16(sample: f32) -> i16 {
    if !sample.is_finite() {
        return 0;
    }
    (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16
}
