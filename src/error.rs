use thiserror::Error;

use crate::config::ConfigError;
use crate::llm::{LLMError, ToolError};
use crate::protocol::ProtocolError;
use crate::server::ServerError;
use crate::stt::STTError;
use crate::tts::TTSError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    LLM(#[from] LLMError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("STT error: {0}")]
    STT(#[from] STTError),

    #[error("TTS error: {0}")]
    TTS(#[from] TTSError),

    #[error("VAD error: {0}")]
    VAD(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    #[error("Session error: {0}")]
    Session(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
