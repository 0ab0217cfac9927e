#![allow(dead_code)]

use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use story_agent::error::Result as AgentResult;
use story_agent::llm::{LLMClient, LLMError, LLMResponse, Message, Role, ToolCall, Usage};
use story_agent::protocol::ServerEvent;
use story_agent::session::{Providers, SessionOutput};
use story_agent::stt::{STTError, SpeechToText};
use story_agent::tts::{TTSError, TextToSpeech};
use story_agent::vad::{DetectorFactory, SpeechDetector, VADConfig};
use tokio::sync::Notify;

pub const CHUNK: usize = 512;

pub fn reply(content: &str) -> LLMResponse {
    LLMResponse {
        content: content.to_string(),
        usage: Some(Usage {
            prompt_tokens: 20,
            completion_tokens: 10,
            total_tokens: 30,
        }),
        model: "scripted".to_string(),
        finish_reason: Some("stop".to_string()),
        tool_calls: Vec::new(),
    }
}

pub fn tool_calls(calls: &[(&str, Value)]) -> LLMResponse {
    LLMResponse {
        tool_calls: calls
            .iter()
            .enumerate()
            .map(|(i, (name, arguments))| ToolCall {
                id: format!("call_{}", i),
                name: name.to_string(),
                arguments: arguments.clone(),
            })
            .collect(),
        finish_reason: Some("tool_calls".to_string()),
        ..reply("")
    }
}

pub fn attribute(kind: &str, value: &str) -> (&'static str, Value) {
    ("record_user_attribute", json!({ "kind": kind, "value": value }))
}

fn tool_names(tools: &[Value]) -> Vec<String> {
    tools
        .iter()
        .filter_map(|t| t["function"]["name"].as_str())
        .map(str::to_string)
        .collect()
}

/// Replays responses in order and records what each request offered
pub struct ScriptedLLM {
    responses: Mutex<VecDeque<std::result::Result<LLMResponse, LLMError>>>,
    offered: Mutex<Vec<Vec<String>>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLLM {
    pub fn new(responses: Vec<std::result::Result<LLMResponse, LLMError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            offered: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Tool names offered on each request, in order
    pub fn offered(&self) -> Vec<Vec<String>> {
        self.offered.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LLMClient for ScriptedLLM {
    async fn complete_with_internal_tools(
        &self,
        messages: Vec<Message>,
        tools: &[Value],
    ) -> std::result::Result<LLMResponse, LLMError> {
        self.offered.lock().unwrap().push(tool_names(tools));
        self.requests.lock().unwrap().push(messages);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(reply("Tell me more.")))
    }
}

/// Stateless model that plays both agents from the conversation alone, so one
/// instance can serve any number of sessions at once.
///
/// "I'm <name> from <location>" introduces the listener; "the end" finishes the story.
pub struct PersonaLLM;

impl PersonaLLM {
    fn last_user_message(messages: &[Message]) -> Option<&str> {
        messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    fn introduction(messages: &[Message]) -> LLMResponse {
        // Tool results mean the attributes were just recorded
        if messages.last().is_some_and(|m| m.role == Role::Tool) {
            return reply("Thanks! Anything else?");
        }

        let Some(said) = Self::last_user_message(messages) else {
            return reply("Hi, I'm Echo! What's your name and where are you from?");
        };

        match said
            .strip_prefix("I'm ")
            .and_then(|rest| rest.split_once(" from "))
        {
            Some((name, location)) => tool_calls(&[
                attribute("name", name),
                attribute("location", location),
            ]),
            None => reply("Could you tell me your name and where you're from?"),
        }
    }

    fn storytelling(messages: &[Message]) -> LLMResponse {
        if Self::last_user_message(messages) == Some("the end") {
            return tool_calls(&[("story_finished", json!({}))]);
        }

        let listener = messages
            .iter()
            .find(|m| m.role == Role::System)
            .and_then(|m| m.content.split("The user's name is ").nth(1))
            .and_then(|rest| rest.strip_suffix('.'))
            .unwrap_or("nobody");

        reply(&format!("Once upon a time there was {}.", listener))
    }
}

#[async_trait::async_trait]
impl LLMClient for PersonaLLM {
    async fn complete_with_internal_tools(
        &self,
        messages: Vec<Message>,
        tools: &[Value],
    ) -> std::result::Result<LLMResponse, LLMError> {
        let names = tool_names(tools);
        if names.iter().any(|n| n == "record_user_attribute") {
            Ok(Self::introduction(&messages))
        } else if names.iter().any(|n| n == "story_finished") {
            Ok(Self::storytelling(&messages))
        } else {
            Ok(reply("Goodbye!"))
        }
    }
}

/// Greets at once, then takes a long time over every later request.
/// `abandoned` is notified when an unfinished request is dropped.
pub struct SlowLLM {
    calls: AtomicUsize,
    delay: Duration,
    pub abandoned: Arc<Notify>,
}

impl SlowLLM {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            abandoned: Arc::new(Notify::new()),
        })
    }
}

struct Abandoned(Option<Arc<Notify>>);

impl Drop for Abandoned {
    fn drop(&mut self) {
        if let Some(notify) = self.0.take() {
            notify.notify_one();
        }
    }
}

#[async_trait::async_trait]
impl LLMClient for SlowLLM {
    async fn complete_with_internal_tools(
        &self,
        _messages: Vec<Message>,
        _tools: &[Value],
    ) -> std::result::Result<LLMResponse, LLMError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Ok(reply("Hi, I'm Echo! What's your name?"));
        }

        let mut guard = Abandoned(Some(Arc::clone(&self.abandoned)));
        tokio::time::sleep(self.delay).await;
        guard.0 = None;
        Ok(reply("Sorry, I was miles away."))
    }
}

/// Transcribes every utterance to the same text
pub struct FixedSTT(pub String);

#[async_trait::async_trait]
impl SpeechToText for FixedSTT {
    async fn transcribe(&self, _samples: &[i16]) -> std::result::Result<String, STTError> {
        Ok(self.0.clone())
    }

    fn provider(&self) -> &'static str {
        "fixed"
    }
}

pub struct FailingSTT;

#[async_trait::async_trait]
impl SpeechToText for FailingSTT {
    async fn transcribe(&self, _samples: &[i16]) -> std::result::Result<String, STTError> {
        Err(STTError::ApiError {
            status: 503,
            message: "unavailable".to_string(),
        })
    }

    fn provider(&self) -> &'static str {
        "failing"
    }
}

/// "Synthesizes" two bytes per character
pub struct EchoTTS;

#[async_trait::async_trait]
impl TextToSpeech for EchoTTS {
    async fn synthesize(&self, text: &str) -> std::result::Result<Vec<u8>, TTSError> {
        Ok(vec![0; text.chars().count() * 2])
    }
}

/// Calls anything loud speech
pub struct Loudness;

impl SpeechDetector for Loudness {
    fn speech_probability(&mut self, chunk: &[i16]) -> AgentResult<f32> {
        let peak = chunk.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);
        Ok(if peak > 1000 { 0.9 } else { 0.1 })
    }

    fn reset(&mut self) {}
}

pub fn loudness_factory() -> DetectorFactory {
    Arc::new(|_config: &VADConfig| -> AgentResult<Box<dyn SpeechDetector>> {
        Ok(Box::new(Loudness))
    })
}

pub fn providers(
    llm: Arc<dyn LLMClient>,
    stt: Arc<dyn SpeechToText>,
    tts: Option<Arc<dyn TextToSpeech>>,
) -> Providers {
    Providers {
        llm,
        stt,
        tts,
        vad: VADConfig::default(),
        detector: loudness_factory(),
    }
}

pub fn text_only(llm: Arc<dyn LLMClient>) -> Providers {
    providers(llm, Arc::new(FixedSTT(String::new())), None)
}

/// One spoken utterance framed by silence, as microphone samples
pub fn spoken_utterance() -> Vec<i16> {
    let mut samples = vec![0; 5 * CHUNK];
    samples.extend(vec![5000; 20 * CHUNK]);
    samples.extend(vec![0; 16 * CHUNK]);
    samples
}

/// Split session output into events and the number of audio frames
pub fn split_outputs(outputs: Vec<SessionOutput>) -> (Vec<ServerEvent>, usize) {
    let mut events = Vec::new();
    let mut audio_frames = 0;
    for output in outputs {
        match output {
            SessionOutput::Event(event) => events.push(event),
            SessionOutput::Audio(_) => audio_frames += 1,
        }
    }
    (events, audio_frames)
}
