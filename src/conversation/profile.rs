use crate::llm::{AttributeKind, ToolError};
use serde::Serialize;

/// What the introduction has learned about the listener
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    name: Option<String>,
    location: Option<String>,
}

impl UserProfile {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn get(&self, kind: AttributeKind) -> Option<&str> {
        match kind {
            AttributeKind::Name => self.name(),
            AttributeKind::Location => self.location(),
        }
    }

    /// Both attributes, once both are known
    pub fn completed(&self) -> Option<(&str, &str)> {
        Some((self.name()?, self.location()?))
    }

    pub fn is_complete(&self) -> bool {
        self.completed().is_some()
    }

    /// Store a trimmed value. Blank values are rejected and leave the profile untouched.
    pub(crate) fn record(&mut self, kind: AttributeKind, value: &str) -> Result<(), ToolError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ToolError::InvalidParameters(format!(
                "{} cannot be empty",
                kind
            )));
        }

        let slot = match kind {
            AttributeKind::Name => &mut self.name,
            AttributeKind::Location => &mut self.location,
        };
        *slot = Some(value.to_string());
        Ok(())
    }
}
