pub mod config;
pub mod conversation;
pub mod error;
pub mod health;
pub mod llm;
pub mod protocol;
pub mod server;
pub mod session;
pub mod stt;
pub mod tts;
pub mod vad;

pub use error::{AgentError, Result};
