use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LLMError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Response parsing error: {0}")]
    ParseError(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Clone)]
pub struct LLMConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.8,
            max_tokens: Some(1024),
            timeout: Duration::from_secs(60), // LLM calls can be slow
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Calls requested by the assistant in this message
    pub tool_calls: Vec<ToolCall>,
    /// Set on tool results
    pub tool_call_id: Option<String>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn assistant_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::new(Role::Assistant, content)
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, content)
        }
    }

    fn to_json(&self) -> Value {
        let mut value = json!({
            "role": self.role.as_str(),
            "content": self.content,
        });

        if !self.tool_calls.is_empty() {
            if self.content.is_empty() {
                value["content"] = Value::Null;
            }
            value["tool_calls"] = self
                .tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": call.arguments.to_string(),
                        }
                    })
                })
                .collect();
        }

        if let Some(ref id) = self.tool_call_id {
            value["tool_call_id"] = json!(id);
        }

        value
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// `Value::Null` when the model sent arguments that were not valid JSON
    pub arguments: Value,
}

#[derive(Debug)]
pub struct LLMResponse {
    pub content: String,
    pub usage: Option<Usage>,
    pub model: String,
    pub finish_reason: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn accumulate(&mut self, other: &Usage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(other.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }
}

#[async_trait::async_trait]
pub trait LLMClient: Send + Sync {
    async fn complete_with_internal_tools(
        &self,
        messages: Vec<Message>,
        tools: &[Value],
    ) -> Result<LLMResponse, LLMError>;
}

/// OpenAI chat completions with function calling
pub struct OpenAILLM {
    client: Client,
    api_key: String,
    base_url: String,
    config: LLMConfig,
}

impl OpenAILLM {
    pub fn new(api_key: String) -> Result<Self, LLMError> {
        Self::with_config(api_key, LLMConfig::default())
    }

    pub fn with_config(api_key: String, config: LLMConfig) -> Result<Self, LLMError> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            config,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Generate a completion with tools
    pub async fn complete_with_tools(
        &self,
        messages: Vec<Message>,
        config: &LLMConfig,
        tools: &[Value],
    ) -> Result<LLMResponse, LLMError> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = build_payload(&messages, config, tools);

        log::debug!(
            "🧠 Requesting completion ({} messages, {} tools)",
            messages.len(),
            tools.len()
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LLMError::ApiError {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let response_text = response.text().await?;
        parse_response(&response_text, &config.model)
    }
}

#[async_trait::async_trait]
impl LLMClient for OpenAILLM {
    async fn complete_with_internal_tools(
        &self,
        messages: Vec<Message>,
        tools: &[Value],
    ) -> Result<LLMResponse, LLMError> {
        self.complete_with_tools(messages, &self.config, tools)
            .await
    }
}

fn build_payload(messages: &[Message], config: &LLMConfig, tools: &[Value]) -> Value {
    let messages_json: Vec<Value> = messages.iter().map(Message::to_json).collect();

    let mut payload = json!({
        "model": config.model,
        "messages": messages_json,
        "temperature": config.temperature,
        "stream": false
    });

    if let Some(max_tokens) = config.max_tokens {
        payload["max_tokens"] = json!(max_tokens);
    }

    if !tools.is_empty() {
        payload["tools"] = json!(tools);
        payload["tool_choice"] = json!("auto");
    }

    payload
}

/// Parse a chat completions response body
fn parse_response(response_text: &str, default_model: &str) -> Result<LLMResponse, LLMError> {
    let json: Value = serde_json::from_str(response_text)
        .map_err(|e| LLMError::ParseError(format!("Invalid JSON: {}", e)))?;

    let first_choice = json["choices"]
        .as_array()
        .ok_or_else(|| LLMError::ParseError("Missing 'choices' field".to_string()))?
        .first()
        .ok_or_else(|| LLMError::ParseError("Empty choices array".to_string()))?;

    let message = &first_choice["message"];

    let content = message["content"]
        .as_str()
        .unwrap_or("") // Content is null when only tool calls are made
        .to_string();

    let finish_reason = first_choice["finish_reason"]
        .as_str()
        .map(|s| s.to_string());

    let model = json["model"].as_str().unwrap_or(default_model).to_string();

    let usage = json.get("usage").map(|usage_json| Usage {
        prompt_tokens: usage_json["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        completion_tokens: usage_json["completion_tokens"].as_u64().unwrap_or(0) as u32,
        total_tokens: usage_json["total_tokens"].as_u64().unwrap_or(0) as u32,
    });

    let mut tool_calls = Vec::new();
    if let Some(tool_calls_array) = message.get("tool_calls").and_then(Value::as_array) {
        for tool_call_json in tool_calls_array {
            if let (Some(id), Some(name), Some(raw_arguments)) = (
                tool_call_json["id"].as_str(),
                tool_call_json["function"]["name"].as_str(),
                tool_call_json["function"]["arguments"].as_str(),
            ) {
                let arguments = serde_json::from_str(raw_arguments).unwrap_or_else(|e| {
                    log::warn!("Tool call '{}' has unparseable arguments: {}", name, e);
                    Value::Null
                });

                tool_calls.push(ToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments,
                });
            } else {
                log::warn!("Skipping malformed tool call: {}", tool_call_json);
            }
        }
    }

    Ok(LLMResponse {
        content,
        usage,
        model,
        finish_reason,
        tool_calls,
    })
}
