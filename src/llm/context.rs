use super::client::{Message, Role};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct ConversationContext {
    messages: VecDeque<Message>,
    max_messages: usize,
    max_tokens: usize,
    system_message: Option<Message>,
}

impl ConversationContext {
    /// Create a new conversation context
    pub fn new(max_messages: usize, max_tokens: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            max_messages,
            max_tokens,
            system_message: None,
        }
    }

    /// Create with default limits (20 messages, ~8000 tokens)
    pub fn with_defaults() -> Self {
        Self::new(20, 8000)
    }

    /// Create with default limits and the given system prompt
    pub fn with_system_message(content: impl Into<String>) -> Self {
        let mut context = Self::with_defaults();
        context.set_system_message(content);
        context
    }

    /// Set the system message
    pub fn set_system_message(&mut self, content: impl Into<String>) {
        self.system_message = Some(Message::system(content));
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.add_message(Message::user(content));
    }

    pub fn add_assistant_message(&mut self, content: impl Into<String>) {
        self.add_message(Message::assistant(content));
    }

    /// Add a message to the context
    pub fn add_message(&mut self, message: Message) {
        self.messages.push_back(message);
        self.trim_context();
    }

    /// Get all messages for API call (includes system message if set)
    pub fn get_messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);

        if let Some(ref system_msg) = self.system_message {
            messages.push(system_msg.clone());
        }

        messages.extend(self.messages.iter().cloned());
        messages
    }

    /// Get conversation length (excluding system message)
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if conversation is empty (excluding system message)
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Estimate token count (rough approximation)
    fn estimate_tokens(&self) -> usize {
        self.system_message
            .iter()
            .chain(self.messages.iter())
            .map(Self::estimate_message_tokens)
            .sum()
    }

    /// Rough token estimation for a single message
    fn estimate_message_tokens(message: &Message) -> usize {
        // Rough approximation: 1 token ≈ 4 characters for English text
        let tool_chars: usize = message
            .tool_calls
            .iter()
            .map(|call| call.name.len() + call.arguments.to_string().len())
            .sum();
        (message.content.len() + tool_chars) / 4 + 10
    }

    /// Trim context to stay within limits
    fn trim_context(&mut self) {
        while self.messages.len() > self.max_messages {
            self.messages.pop_front();
        }

        while self.estimate_tokens() > self.max_tokens && !self.messages.is_empty() {
            self.messages.pop_front();
        }

        // A tool result must follow the assistant message that requested it
        while self
            .messages
            .front()
            .is_some_and(|m| m.role == Role::Tool)
        {
            self.messages.pop_front();
        }
    }

    /// Get context summary for debugging
    pub fn summary(&self) -> String {
        format!(
            "Context: {} messages, ~{} tokens (limits: {} messages, {} tokens)",
            self.len(),
            self.estimate_tokens(),
            self.max_messages,
            self.max_tokens
        )
    }
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::ToolCall;
    use serde_json::json;

    #[test]
    fn test_message_addition() {
        let mut context = ConversationContext::new(5, 1000);

        context.set_system_message("You are a storyteller");
        context.add_user_message("Hello");
        context.add_assistant_message("Hi there!");

        assert_eq!(context.len(), 2); // System message not counted in len()

        let messages = context.get_messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[2].role, Role::Assistant);
    }

    #[test]
    fn test_message_trimming() {
        let mut context = ConversationContext::new(3, 10000);

        for i in 0..5 {
            context.add_user_message(format!("Message {}", i));
        }

        assert_eq!(context.len(), 3);
        let messages = context.get_messages();
        assert!(messages.last().unwrap().content.contains("Message 4"));
    }

    #[test]
    fn test_trimming_never_leaves_orphan_tool_result() {
        let mut context = ConversationContext::new(2, 10000);
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "record_user_attribute".to_string(),
            arguments: json!({"kind": "name", "value": "Ava"}),
        };

        context.add_message(Message::assistant_tool_calls("", vec![call]));
        context.add_message(Message::tool_result("call_1", "recorded"));
        context.add_assistant_message("Nice to meet you, Ava.");

        // The assistant tool call fell off the front, so its result went with it
        assert_eq!(context.len(), 1);
        assert_eq!(context.get_messages()[0].role, Role::Assistant);
    }

    #[test]
    fn test_summary() {
        let context = ConversationContext::with_defaults();
        assert!(context.summary().starts_with("Context: 0 messages"));
    }
}
