use super::profile::UserProfile;
use super::state::{ConversationState, StateKind};
use crate::llm::{
    AttributeKind, ConversationContext, ConversationTemplates, LLMClient, LLMError, Message,
    SystemPrompts, ToolCall, ToolError, ToolInvocation, ToolName, Usage,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::Display;

/// Upper bound on model → tool → model round trips within a single turn
const MAX_TOOL_ROUNDS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UtteranceKind {
    /// Ordinary agent reply
    Reply,
    /// Spoken once, when the storyteller takes over
    Transition,
    /// Stand-in for a reply the model could not produce
    Fallback,
    /// Last words before the session closes
    Farewell,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub kind: UtteranceKind,
    pub text: String,
    /// State that was active when the utterance was produced
    pub state: StateKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handoff {
    pub name: String,
    pub location: String,
    pub utterance: Utterance,
}

/// Everything one call into the controller produced, in speaking order
#[derive(Debug, Default)]
pub struct TurnOutcome {
    pub utterances: Vec<Utterance>,
    pub handoff: Option<Handoff>,
    /// The storyteller has said goodbye; the transport should close
    pub finished: bool,
}

impl TurnOutcome {
    pub fn is_silent(&self) -> bool {
        self.utterances.is_empty()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.utterances.iter().map(|u| u.text.as_str()).collect()
    }

    pub fn contains(&self, kind: UtteranceKind) -> bool {
        self.utterances.iter().any(|u| u.kind == kind)
    }
}

enum Flow {
    Settled,
    HandedOff,
    Finished,
}

enum ToolOutcome {
    /// Text returned to the model as the tool result
    Answer(String),
    HandedOff,
    Finished,
}

/// State the controller returns to when a turn fails before the handoff
struct Checkpoint {
    context: ConversationContext,
    profile: UserProfile,
}

/// Owns one session's conversation: the active agent, the listener's profile
/// and the message history sent to the model.
pub struct ConversationController {
    llm: Arc<dyn LLMClient>,
    state: ConversationState,
    profile: UserProfile,
    context: ConversationContext,
    usage: Usage,
    finished: bool,
}

impl ConversationController {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        let state = ConversationState::Introduction;
        let context = ConversationContext::with_system_message(state.system_prompt());

        Self {
            llm,
            state,
            profile: UserProfile::default(),
            context,
            usage: Usage::default(),
            finished: false,
        }
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    /// Token usage accumulated over every model call of this session
    pub fn usage(&self) -> Usage {
        self.usage
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn context_summary(&self) -> String {
        self.context.summary()
    }

    /// Let the active agent speak first
    pub async fn greet(&mut self) -> TurnOutcome {
        let mut outcome = TurnOutcome::default();
        let checkpoint = self.checkpoint();
        self.converse(&mut outcome, checkpoint).await;
        outcome
    }

    /// Run one transcript through the active agent
    pub async fn handle_transcript(&mut self, text: &str) -> TurnOutcome {
        let mut outcome = TurnOutcome::default();
        let text = text.trim();

        if text.is_empty() {
            log::debug!("Empty transcript received, nothing to answer");
            return outcome;
        }
        if self.finished {
            log::debug!("Story already finished, ignoring transcript");
            return outcome;
        }

        log::info!("📝 [{}] Transcript: '{}'", self.state.kind(), text);

        let checkpoint = self.checkpoint();
        self.context.add_user_message(text);
        self.converse(&mut outcome, checkpoint).await;
        outcome
    }

    /// Store a listener attribute, then check whether the storyteller can take over.
    ///
    /// Only available during the introduction. Blank values are rejected without
    /// touching the profile and without a handoff check.
    pub fn record_user_attribute(
        &mut self,
        kind: AttributeKind,
        value: &str,
    ) -> Result<Option<Handoff>, ToolError> {
        if self.state.kind() != StateKind::Introduction {
            return Err(ToolError::Unavailable {
                tool: ToolName::RecordUserAttribute.to_string(),
                state: self.state.kind().to_string(),
            });
        }

        self.profile.record(kind, value)?;
        log::info!("🪪 Recorded {}: '{}'", kind, value.trim());

        Ok(self.maybe_handoff())
    }

    /// Swap to the storyteller once both attributes are known. A no-op afterwards.
    pub fn maybe_handoff(&mut self) -> Option<Handoff> {
        let next = self.state.next(&self.profile)?;
        let (name, location) = self
            .profile
            .completed()
            .map(|(name, location)| (name.to_string(), location.to_string()))?;

        log::info!(
            "🎬 Switching to the story agent with the provided user data: name='{}', location='{}'",
            name,
            location
        );

        // The storyteller starts from a fresh context built around its own prompt
        self.context = ConversationContext::with_system_message(next.system_prompt());
        self.state = next;

        Some(Handoff {
            name,
            location,
            utterance: self.utterance(UtteranceKind::Transition, ConversationTemplates::handoff()),
        })
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            context: self.context.clone(),
            profile: self.profile.clone(),
        }
    }

    fn utterance(&self, kind: UtteranceKind, text: impl Into<String>) -> Utterance {
        Utterance {
            kind,
            text: text.into(),
            state: self.state.kind(),
        }
    }

    async fn converse(&mut self, outcome: &mut TurnOutcome, checkpoint: Checkpoint) {
        loop {
            match self.run_rounds(outcome).await {
                Ok(Flow::Settled) => break,
                // The storyteller opens with its own reply
                Ok(Flow::HandedOff) => continue,
                Ok(Flow::Finished) => {
                    self.say_goodbye(outcome).await;
                    break;
                }
                Err(e) => {
                    log::error!("❌ [{}] LLM request failed: {}", self.state.kind(), e);
                    if outcome.handoff.is_none() {
                        self.context = checkpoint.context;
                        self.profile = checkpoint.profile;
                        outcome.utterances.clear();
                    }
                    let fallback = self.utterance(
                        UtteranceKind::Fallback,
                        ConversationTemplates::voice_error("processing"),
                    );
                    outcome.utterances.push(fallback);
                    break;
                }
            }
        }
    }

    /// Ask the model for a reply, executing tool calls until it answers in plain text
    async fn run_rounds(&mut self, outcome: &mut TurnOutcome) -> Result<Flow, LLMError> {
        let tools = self.state.tool_registry().get_tool_definitions();

        for round in 0..=MAX_TOOL_ROUNDS {
            let response = self
                .llm
                .complete_with_internal_tools(self.context.get_messages(), &tools)
                .await?;

            if let Some(ref usage) = response.usage {
                self.usage.accumulate(usage);
            }

            let content = response.content.trim().to_string();
            if !content.is_empty() {
                outcome
                    .utterances
                    .push(self.utterance(UtteranceKind::Reply, content.clone()));
            }

            if response.tool_calls.is_empty() || round == MAX_TOOL_ROUNDS {
                if !response.tool_calls.is_empty() {
                    log::warn!(
                        "🔧 Tool round limit reached, ignoring {} tool calls",
                        response.tool_calls.len()
                    );
                }
                if !content.is_empty() {
                    self.context.add_assistant_message(content);
                }
                return Ok(Flow::Settled);
            }

            log::debug!(
                "🔧 [{}] Model requested {} tool calls",
                self.state.kind(),
                response.tool_calls.len()
            );
            self.context.add_message(Message::assistant_tool_calls(
                content,
                response.tool_calls.clone(),
            ));

            let mut finished = false;
            for call in &response.tool_calls {
                if finished {
                    self.context
                        .add_message(Message::tool_result(&call.id, "Ignored: the story is over."));
                    continue;
                }

                match self.dispatch(call, outcome) {
                    ToolOutcome::Answer(text) => {
                        self.context.add_message(Message::tool_result(&call.id, text));
                    }
                    ToolOutcome::HandedOff => return Ok(Flow::HandedOff),
                    ToolOutcome::Finished => {
                        self.context
                            .add_message(Message::tool_result(&call.id, "Ending the session."));
                        finished = true;
                    }
                }
            }

            if finished {
                return Ok(Flow::Finished);
            }
        }

        Ok(Flow::Settled)
    }

    fn dispatch(&mut self, call: &ToolCall, outcome: &mut TurnOutcome) -> ToolOutcome {
        let invocation = match ToolInvocation::parse(call) {
            Ok(invocation) => invocation,
            Err(e) => {
                log::warn!("🔧 Rejected tool call '{}': {}", call.name, e);
                return ToolOutcome::Answer(format!("Error: {}", e));
            }
        };

        if !self.state.permits(&invocation) {
            let e = ToolError::Unavailable {
                tool: invocation.name().to_string(),
                state: self.state.kind().to_string(),
            };
            log::warn!("🔧 Rejected tool call: {}", e);
            return ToolOutcome::Answer(format!("Error: {}", e));
        }

        match invocation {
            ToolInvocation::RecordUserAttribute(args) => {
                match self.record_user_attribute(args.kind, &args.value) {
                    Ok(Some(handoff)) => {
                        outcome.utterances.push(handoff.utterance.clone());
                        outcome.handoff = Some(handoff);
                        ToolOutcome::HandedOff
                    }
                    Ok(None) => ToolOutcome::Answer(self.missing_attributes_note(args.kind)),
                    Err(e) => {
                        log::warn!("🔧 Ignored {} attribute: {}", args.kind, e);
                        ToolOutcome::Answer(format!("Error: {}", e))
                    }
                }
            }
            ToolInvocation::StoryFinished(_) => {
                log::info!("📕 Storyteller reports the story is finished");
                ToolOutcome::Finished
            }
        }
    }

    fn missing_attributes_note(&self, recorded: AttributeKind) -> String {
        let missing: Vec<String> = [AttributeKind::Name, AttributeKind::Location]
            .into_iter()
            .filter(|kind| self.profile.get(*kind).is_none())
            .map(|kind| kind.to_string())
            .collect();

        if missing.is_empty() {
            format!("Recorded {}.", recorded)
        } else {
            format!("Recorded {}. Still missing: {}.", recorded, missing.join(", "))
        }
    }

    async fn say_goodbye(&mut self, outcome: &mut TurnOutcome) {
        self.finished = true;
        outcome.finished = true;

        let name = self.profile.name().map(str::to_string);
        let mut messages = self.context.get_messages();
        messages.push(Message::system(SystemPrompts::goodbye(
            name.as_deref().unwrap_or("the listener"),
        )));

        let text = match self.llm.complete_with_internal_tools(messages, &[]).await {
            Ok(response) if !response.content.trim().is_empty() => {
                if let Some(ref usage) = response.usage {
                    self.usage.accumulate(usage);
                }
                response.content.trim().to_string()
            }
            Ok(_) => ConversationTemplates::goodbye(name.as_deref()),
            Err(e) => {
                log::warn!("Goodbye generation failed, using template: {}", e);
                ConversationTemplates::goodbye(name.as_deref())
            }
        };

        self.context.add_assistant_message(text.clone());
        outcome
            .utterances
            .push(self.utterance(UtteranceKind::Farewell, text));
    }
}
