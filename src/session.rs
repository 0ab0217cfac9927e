//! One participant's lifetime: audio in, conversation, speech out.

use crate::conversation::{ConversationController, StateKind, TurnOutcome, Utterance, UtteranceKind};
use crate::error::{AgentError, Result};
use crate::llm::{ConversationTemplates, LLMClient, Usage};
use crate::protocol::ServerEvent;
use crate::stt::SpeechToText;
use crate::tts::TextToSpeech;
use crate::vad::{DetectorFactory, UtteranceSegmenter, VADConfig};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use strum::Display;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Provider clients built once at startup and shared by every session
#[derive(Clone)]
pub struct Providers {
    pub llm: Arc<dyn LLMClient>,
    pub stt: Arc<dyn SpeechToText>,
    /// `None` runs the session text-only
    pub tts: Option<Arc<dyn TextToSpeech>>,
    pub vad: VADConfig,
    pub detector: DetectorFactory,
}

/// How the agent presents itself to the participant
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    pub agent: String,
    pub room: String,
}

#[derive(Debug)]
pub enum SessionInput {
    /// 16kHz mono samples from the participant's microphone
    Audio(Vec<i16>),
    Transcript(String),
    Hangup,
}

#[derive(Debug)]
pub enum SessionOutput {
    Event(ServerEvent),
    /// PCM16 LE speech for the participant
    Audio(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum EndReason {
    Hangup,
    StoryFinished,
    /// The participant stopped sending
    InputClosed,
    Cancelled,
}

/// What a session consumed, reported when it ends
#[derive(Debug, Clone)]
pub struct UsageTotals {
    pub llm: Usage,
    pub tts_characters: usize,
    pub transcriptions: usize,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl UsageTotals {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            llm: Usage::default(),
            tts_characters: 0,
            transcriptions: 0,
            started_at: now,
            ended_at: now,
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.ended_at - self.started_at
    }
}

pub struct Session {
    id: String,
    identity: SessionIdentity,
    providers: Providers,
    controller: ConversationController,
    segmenter: UtteranceSegmenter,
    outbound: mpsc::Sender<SessionOutput>,
    totals: UsageTotals,
}

impl Session {
    pub fn new(
        providers: Providers,
        identity: SessionIdentity,
        outbound: mpsc::Sender<SessionOutput>,
    ) -> Result<Self> {
        let detector = (providers.detector)(&providers.vad)?;
        let segmenter = UtteranceSegmenter::new(detector, providers.vad.clone());
        let controller = ConversationController::new(Arc::clone(&providers.llm));

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            identity,
            providers,
            controller,
            segmenter,
            outbound,
            totals: UsageTotals::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run until the participant leaves, the story ends or `cancel` fires.
    ///
    /// Inputs are handled strictly in order; a cancellation aborts whatever
    /// provider call is in flight.
    pub async fn run(
        mut self,
        mut inbound: mpsc::Receiver<SessionInput>,
        cancel: CancellationToken,
    ) -> Result<UsageTotals> {
        log::info!(
            "🎯 Session {} started for agent '{}' in room '{}'",
            self.id,
            self.identity.agent,
            self.identity.room
        );

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(EndReason::Cancelled),
            result = self.drive(&mut inbound) => result,
        };

        self.totals.llm = self.controller.usage();
        self.totals.ended_at = Utc::now();

        match result {
            Ok(reason) => {
                log::info!(
                    "👋 Session {} ended ({}) after {}s: {} LLM tokens, {} transcriptions, {} TTS characters",
                    self.id,
                    reason,
                    self.totals.duration().num_seconds(),
                    self.totals.llm.total_tokens,
                    self.totals.transcriptions,
                    self.totals.tts_characters
                );
                log::debug!("Final context: {}", self.controller.context_summary());

                // The participant may already be gone
                let _ = self
                    .outbound
                    .send(SessionOutput::Event(ServerEvent::SessionEnded {
                        reason: reason.to_string(),
                    }))
                    .await;
                Ok(self.totals)
            }
            Err(e) => {
                log::error!("❌ Session {} failed: {}", self.id, e);
                let _ = self
                    .outbound
                    .send(SessionOutput::Event(ServerEvent::Error {
                        message: e.to_string(),
                    }))
                    .await;
                Err(e)
            }
        }
    }

    async fn drive(&mut self, inbound: &mut mpsc::Receiver<SessionInput>) -> Result<EndReason> {
        self.send(ServerEvent::SessionStarted {
            session_id: self.id.clone(),
            agent: self.identity.agent.clone(),
            room: self.identity.room.clone(),
        })
        .await?;

        let greeting = self.controller.greet().await;
        if self.deliver(greeting).await? {
            return Ok(EndReason::StoryFinished);
        }

        while let Some(input) = inbound.recv().await {
            let finished = match input {
                SessionInput::Audio(samples) => self.handle_audio(&samples).await?,
                SessionInput::Transcript(text) => self.answer(&text).await?,
                SessionInput::Hangup => return Ok(EndReason::Hangup),
            };

            if finished {
                return Ok(EndReason::StoryFinished);
            }
        }

        Ok(EndReason::InputClosed)
    }

    async fn handle_audio(&mut self, samples: &[i16]) -> Result<bool> {
        let utterances = match self.segmenter.push(samples) {
            Ok(utterances) => utterances,
            Err(e) => {
                log::warn!("⚠️ Voice activity detection failed, resetting: {}", e);
                self.segmenter.reset();
                return Ok(false);
            }
        };

        for utterance in utterances {
            if self.transcribe_and_answer(&utterance).await? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    async fn transcribe_and_answer(&mut self, samples: &[i16]) -> Result<bool> {
        let stt = Arc::clone(&self.providers.stt);
        match stt.transcribe(samples).await {
            Ok(text) if text.trim().is_empty() => {
                log::debug!("🎤 [{}] Utterance transcribed to nothing", stt.provider());
                Ok(false)
            }
            Ok(text) => {
                self.totals.transcriptions += 1;
                self.answer(&text).await
            }
            Err(e) => {
                log::error!("❌ [{}] Transcription failed: {}", stt.provider(), e);
                let fallback = Utterance {
                    kind: UtteranceKind::Fallback,
                    text: ConversationTemplates::voice_error("audio"),
                    state: self.state(),
                };
                self.speak(&fallback).await?;
                Ok(false)
            }
        }
    }

    async fn answer(&mut self, text: &str) -> Result<bool> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(false);
        }

        self.send(ServerEvent::UserTranscript {
            text: text.to_string(),
        })
        .await?;

        let outcome = self.controller.handle_transcript(text).await;
        self.deliver(outcome).await
    }

    /// Send every utterance of a turn in order; returns whether the story is over
    async fn deliver(&mut self, outcome: TurnOutcome) -> Result<bool> {
        for utterance in &outcome.utterances {
            if utterance.kind == UtteranceKind::Transition {
                if let Some(ref handoff) = outcome.handoff {
                    self.send(ServerEvent::Handoff {
                        name: handoff.name.clone(),
                        location: handoff.location.clone(),
                    })
                    .await?;
                }
            }
            self.speak(utterance).await?;
        }

        Ok(outcome.finished)
    }

    async fn speak(&mut self, utterance: &Utterance) -> Result<()> {
        log::info!("🗣️ [{}] {}", utterance.state, utterance.text);
        self.send(ServerEvent::AgentUtterance {
            text: utterance.text.clone(),
            kind: utterance.kind,
            state: utterance.state,
        })
        .await?;

        let Some(tts) = self.providers.tts.clone() else {
            return Ok(());
        };

        // The text already went out, so a failed synthesis only costs the audio
        match tts.synthesize(&utterance.text).await {
            Ok(audio) => {
                self.totals.tts_characters += utterance.text.chars().count();
                self.outbound
                    .send(SessionOutput::Audio(audio))
                    .await
                    .map_err(|_| AgentError::Session("participant channel closed".to_string()))
            }
            Err(e) => {
                log::warn!("🔊 Speech synthesis failed: {}", e);
                Ok(())
            }
        }
    }

    async fn send(&mut self, event: ServerEvent) -> Result<()> {
        self.outbound
            .send(SessionOutput::Event(event))
            .await
            .map_err(|_| AgentError::Session("participant channel closed".to_string()))
    }

    fn state(&self) -> StateKind {
        self.controller.state().kind()
    }
}
