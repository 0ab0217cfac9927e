//! Voice Activity Detection (VAD) Module
//!
//! Speech probabilities come from the Silero neural network model, which is
//! optimized for 16kHz audio and supports chunk sizes of 512, 768, or 1024 samples.
//! The [`UtteranceSegmenter`] turns those per-chunk probabilities into whole
//! utterances ready for speech-to-text.

use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;

pub mod segmenter;
pub mod silero;

pub use segmenter::UtteranceSegmenter;
pub use silero::SileroVAD;

/// Sample rate of all session audio, in both directions
pub const SAMPLE_RATE: u32 = 16_000;

/// Chunk sizes supported by Silero VAD at 16kHz
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkSize {
    /// 512 samples (32ms at 16kHz) - Recommended for low latency
    Small,
    /// 768 samples (48ms at 16kHz) - Balanced
    Medium,
    /// 1024 samples (64ms at 16kHz) - Better accuracy
    Large,
}

impl ChunkSize {
    /// Get the chunk size in samples
    pub fn samples(&self) -> usize {
        match self {
            ChunkSize::Small => 512,
            ChunkSize::Medium => 768,
            ChunkSize::Large => 1024,
        }
    }
}

/// Configuration for voice activity detection and utterance segmentation
#[derive(Debug, Clone)]
pub struct VADConfig {
    /// Chunk size in samples
    pub chunk_size: ChunkSize,
    /// Speech probability threshold (0.0-1.0), default 0.5
    pub threshold: f32,
    /// Number of consecutive speech chunks needed to start an utterance
    pub speech_trigger_chunks: usize,
    /// Number of consecutive silence chunks that end an utterance
    pub silence_stop_chunks: usize,
    /// Chunks of audio kept from before the trigger so the first syllable isn't clipped
    pub preroll_chunks: usize,
    /// Utterances with fewer speech chunks than this are dropped as noise
    pub min_speech_chunks: usize,
    /// Hard cap on a single utterance
    pub max_utterance: Duration,
}

impl Default for VADConfig {
    fn default() -> Self {
        Self {
            chunk_size: ChunkSize::Small, // 512 samples = 32ms at 16kHz
            threshold: 0.5,
            speech_trigger_chunks: 2, // 64ms of speech to trigger
            silence_stop_chunks: 16,  // 512ms of silence to stop
            preroll_chunks: 10,       // 320ms
            min_speech_chunks: 8,     // 256ms
            max_utterance: Duration::from_secs(30),
        }
    }
}

impl VADConfig {
    pub(crate) fn max_utterance_samples(&self) -> usize {
        (self.max_utterance.as_millis() as usize) * (SAMPLE_RATE as usize) / 1000
    }
}

/// Anything that can score a chunk of PCM16 audio for speech
pub trait SpeechDetector: Send {
    /// Probability (0.0-1.0) that the chunk contains speech
    fn speech_probability(&mut self, chunk: &[i16]) -> Result<f32>;

    /// Resets the detector's internal state.
    fn reset(&mut self);
}

/// Builds one detector per session; detectors carry per-stream state
pub type DetectorFactory = Arc<dyn Fn(&VADConfig) -> Result<Box<dyn SpeechDetector>> + Send + Sync>;

/// Factory function to create Silero VAD
pub fn create_vad(config: &VADConfig) -> Result<Box<dyn SpeechDetector>> {
    let vad = SileroVAD::new(config)?;
    Ok(Box::new(vad))
}

/// Default factory used by the server
pub fn silero_factory() -> DetectorFactory {
    Arc::new(create_vad)
}
