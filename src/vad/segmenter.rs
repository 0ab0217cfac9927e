use super::{SpeechDetector, VADConfig};
use crate::error::Result;
use std::collections::VecDeque;

/// Cuts a continuous PCM16 stream into utterances.
///
/// Audio is scored in fixed-size chunks. An utterance opens after
/// `speech_trigger_chunks` consecutive speech chunks (pre-roll included) and
/// closes after `silence_stop_chunks` consecutive silent chunks or when it
/// reaches `max_utterance`.
pub struct UtteranceSegmenter {
    detector: Box<dyn SpeechDetector>,
    config: VADConfig,
    chunk_size: usize,
    pending: Vec<i16>,
    preroll: VecDeque<Vec<i16>>,
    utterance: Vec<i16>,
    speaking: bool,
    speech_run: usize,
    silence_run: usize,
    speech_chunks: usize,
}

impl UtteranceSegmenter {
    pub fn new(detector: Box<dyn SpeechDetector>, config: VADConfig) -> Self {
        let chunk_size = config.chunk_size.samples();
        Self {
            detector,
            chunk_size,
            pending: Vec::with_capacity(chunk_size),
            preroll: VecDeque::with_capacity(config.preroll_chunks + 1),
            utterance: Vec::new(),
            speaking: false,
            speech_run: 0,
            silence_run: 0,
            speech_chunks: 0,
            config,
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Feed samples of any length; returns every utterance they completed
    pub fn push(&mut self, samples: &[i16]) -> Result<Vec<Vec<i16>>> {
        let mut completed = Vec::new();
        self.pending.extend_from_slice(samples);

        while self.pending.len() >= self.chunk_size {
            let chunk: Vec<i16> = self.pending.drain(..self.chunk_size).collect();
            if let Some(utterance) = self.process_chunk(chunk)? {
                completed.push(utterance);
            }
        }

        Ok(completed)
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.preroll.clear();
        self.utterance.clear();
        self.speaking = false;
        self.speech_run = 0;
        self.silence_run = 0;
        self.speech_chunks = 0;
        self.detector.reset();
    }

    fn process_chunk(&mut self, chunk: Vec<i16>) -> Result<Option<Vec<i16>>> {
        let is_speech = self.detector.speech_probability(&chunk)? >= self.config.threshold;

        if !self.speaking {
            self.preroll.push_back(chunk);
            while self.preroll.len() > self.config.preroll_chunks.max(1) {
                self.preroll.pop_front();
            }

            self.speech_run = if is_speech { self.speech_run + 1 } else { 0 };
            if self.speech_run >= self.config.speech_trigger_chunks {
                log::debug!("🎙️ Speech started");
                self.speaking = true;
                self.speech_chunks = self.speech_run;
                self.silence_run = 0;
                self.utterance = self.preroll.drain(..).flatten().collect();
            }
            return Ok(None);
        }

        self.utterance.extend_from_slice(&chunk);
        if is_speech {
            self.speech_chunks += 1;
            self.silence_run = 0;
        } else {
            self.silence_run += 1;
        }

        if self.silence_run >= self.config.silence_stop_chunks
            || self.utterance.len() >= self.config.max_utterance_samples()
        {
            return Ok(self.finish());
        }

        Ok(None)
    }

    fn finish(&mut self) -> Option<Vec<i16>> {
        let utterance = std::mem::take(&mut self.utterance);
        let speech_chunks = self.speech_chunks;

        self.speaking = false;
        self.speech_run = 0;
        self.silence_run = 0;
        self.speech_chunks = 0;

        if speech_chunks < self.config.min_speech_chunks {
            log::debug!(
                "🎙️ Dropping {} speech chunks as noise",
                speech_chunks
            );
            return None;
        }

        log::debug!(
            "🎙️ Utterance complete: {} samples ({} speech chunks)",
            utterance.len(),
            speech_chunks
        );
        Some(utterance)
    }
}
