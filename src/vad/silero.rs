//! Silero VAD implementation

use crate::error::{AgentError, Result};
use crate::vad::{SpeechDetector, VADConfig};
use voice_activity_detector::VoiceActivityDetector;

/// Silero VAD wrapper scoring one fixed-size chunk at a time
pub struct SileroVAD {
    vad: VoiceActivityDetector,
    chunk_size: usize,
    processed_chunks: usize,
}

impl SileroVAD {
    /// Create a new Silero VAD instance
    pub fn new(config: &VADConfig) -> Result<Self> {
        let chunk_size = config.chunk_size.samples();
        let vad = Self::build(chunk_size)?;

        log::debug!(
            "Silero VAD initialized (sample_rate: 16000Hz, chunk_size: {} samples, threshold: {})",
            chunk_size,
            config.threshold
        );

        Ok(Self {
            vad,
            chunk_size,
            processed_chunks: 0,
        })
    }

    fn build(chunk_size: usize) -> Result<VoiceActivityDetector> {
        VoiceActivityDetector::builder()
            .sample_rate(16000)
            .chunk_size(chunk_size)
            .build()
            .map_err(|e| AgentError::VAD(format!("Failed to create Silero VAD: {}", e)))
    }
}

impl SpeechDetector for SileroVAD {
    fn speech_probability(&mut self, chunk: &[i16]) -> Result<f32> {
        if chunk.len() != self.chunk_size {
            return Err(AgentError::VAD(format!(
                "Expected {} samples, got {}",
                self.chunk_size,
                chunk.len()
            )));
        }

        self.processed_chunks += 1;
        let probability = self.vad.predict(chunk.iter().copied());

        if self.processed_chunks % 100 == 0 {
            log::trace!(
                "Silero VAD: {} chunks processed, last probability {:.2}",
                self.processed_chunks,
                probability
            );
        }

        Ok(probability)
    }

    /// The detector doesn't expose a reset, so rebuild it
    fn reset(&mut self) {
        match Self::build(self.chunk_size) {
            Ok(vad) => {
                self.vad = vad;
                self.processed_chunks = 0;
            }
            Err(e) => log::error!("Failed to reset Silero VAD: {}", e),
        }
    }
}
