use super::profile::UserProfile;
use crate::llm::{SystemPrompts, Tool, ToolInvocation, ToolRegistry};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Which agent currently holds the conversation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConversationState {
    /// Gathering the listener's name and location
    #[default]
    Introduction,
    /// Telling the story; terminal for the session
    Storytelling { name: String, location: String },
}

/// Payload-free tag of [`ConversationState`], used in logs and client events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StateKind {
    Introduction,
    Storytelling,
}

impl ConversationState {
    pub fn kind(&self) -> StateKind {
        match self {
            ConversationState::Introduction => StateKind::Introduction,
            ConversationState::Storytelling { .. } => StateKind::Storytelling,
        }
    }

    pub fn system_prompt(&self) -> String {
        match self {
            ConversationState::Introduction => SystemPrompts::introduction(),
            ConversationState::Storytelling { name, location } => {
                SystemPrompts::storytelling(name, location)
            }
        }
    }

    /// Tools the model may call in this state
    pub fn tool_registry(&self) -> ToolRegistry {
        match self {
            ConversationState::Introduction => {
                ToolRegistry::with_tools([Tool::record_user_attribute()])
            }
            ConversationState::Storytelling { .. } => {
                ToolRegistry::with_tools([Tool::story_finished()])
            }
        }
    }

    pub fn permits(&self, invocation: &ToolInvocation) -> bool {
        matches!(
            (self, invocation),
            (ConversationState::Introduction, ToolInvocation::RecordUserAttribute(_))
                | (ConversationState::Storytelling { .. }, ToolInvocation::StoryFinished(_))
        )
    }

    /// Guarded transition: Introduction moves to Storytelling once the profile is complete.
    /// Storytelling has no outgoing transition.
    pub fn next(&self, profile: &UserProfile) -> Option<ConversationState> {
        match self {
            ConversationState::Introduction => {
                let (name, location) = profile.completed()?;
                Some(ConversationState::Storytelling {
                    name: name.to_string(),
                    location: location.to_string(),
                })
            }
            ConversationState::Storytelling { .. } => None,
        }
    }
}
