//! Tool surface offered to the language model.
//!
//! Tool calls arrive as a name plus free-form JSON. They are parsed into the
//! closed [`ToolInvocation`] union with a strict schema per tool; anything else
//! is rejected before it can touch session state.

use super::client::ToolCall;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use strum::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),
    #[error("Tool '{tool}' is not available while {state}")]
    Unavailable { tool: String, state: String },
    #[error("Invalid tool parameters: {0}")]
    InvalidParameters(String),
}

/// Names of every tool the controller understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ToolName {
    RecordUserAttribute,
    StoryFinished,
}

/// A piece of user information the introduction collects
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AttributeKind {
    Name,
    Location,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordUserAttribute {
    pub kind: AttributeKind,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoryFinished {}

/// A validated tool call
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum ToolInvocation {
    RecordUserAttribute(RecordUserAttribute),
    StoryFinished(StoryFinished),
}

impl ToolInvocation {
    /// Parse a raw call from the model, rejecting unknown names and malformed arguments
    pub fn parse(call: &ToolCall) -> Result<Self, ToolError> {
        ToolName::from_str(&call.name).map_err(|_| ToolError::NotFound(call.name.clone()))?;

        let tagged = json!({ "name": call.name, "arguments": call.arguments });
        serde_json::from_value(tagged)
            .map_err(|e| ToolError::InvalidParameters(format!("{}: {}", call.name, e)))
    }

    pub fn name(&self) -> ToolName {
        match self {
            ToolInvocation::RecordUserAttribute(_) => ToolName::RecordUserAttribute,
            ToolInvocation::StoryFinished(_) => ToolName::StoryFinished,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tool {
    pub name: ToolName,
    pub description: String,
    pub parameters: Value,
}

impl Tool {
    pub fn record_user_attribute() -> Self {
        Self {
            name: ToolName::RecordUserAttribute,
            description: "Record a piece of information the user has shared about themselves. \
Call it once for the user's name and once for where they are from."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "kind": {
                        "type": "string",
                        "enum": ["name", "location"],
                        "description": "Which piece of information this is"
                    },
                    "value": {
                        "type": "string",
                        "description": "The value exactly as the user gave it, e.g. 'Ava' or 'Kyoto'"
                    }
                },
                "required": ["kind", "value"],
                "additionalProperties": false
            }),
        }
    }

    pub fn story_finished() -> Self {
        Self {
            name: ToolName::StoryFinished,
            description: "When you are finished telling the story (and the user confirms they \
don't want any more), call this function to end the conversation."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {},
                "required": [],
                "additionalProperties": false
            }),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
}

impl ToolRegistry {
    pub fn with_tools(tools: impl IntoIterator<Item = Tool>) -> Self {
        Self {
            tools: tools.into_iter().collect(),
        }
    }

    pub fn contains(&self, name: ToolName) -> bool {
        self.tools.iter().any(|tool| tool.name == name)
    }

    /// Get tool definitions for LLM function calling
    pub fn get_tool_definitions(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|tool| {
                let name: &'static str = tool.name.into();
                json!({
                    "type": "function",
                    "function": {
                        "name": name,
                        "description": tool.description,
                        "parameters": tool.parameters
                    }
                })
            })
            .collect()
    }
}
