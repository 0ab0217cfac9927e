//! Wire format between a participant and the agent.
//!
//! Text frames carry JSON events tagged by `type`. Binary frames carry raw
//! PCM16 little-endian mono audio at 16kHz, in both directions.

use crate::conversation::{StateKind, UtteranceKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid event: {0}")]
    InvalidEvent(#[from] serde_json::Error),

    #[error("Invalid audio frame: {0} bytes is not a whole number of samples")]
    InvalidAudioFrame(usize),
}

/// Participant → agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Already-transcribed speech, skipping the agent's own speech-to-text
    Transcript { text: String },
    Hangup,
}

/// Agent → participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    SessionStarted {
        session_id: String,
        agent: String,
        room: String,
    },
    UserTranscript {
        text: String,
    },
    AgentUtterance {
        text: String,
        kind: UtteranceKind,
        state: StateKind,
    },
    Handoff {
        name: String,
        location: String,
    },
    SessionEnded {
        reason: String,
    },
    Error {
        message: String,
    },
}

impl ClientEvent {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

impl ServerEvent {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Decode a binary frame into samples
pub fn decode_pcm16(bytes: &[u8]) -> Result<Vec<i16>, ProtocolError> {
    if bytes.len() % 2 != 0 {
        return Err(ProtocolError::InvalidAudioFrame(bytes.len()));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

pub fn encode_pcm16(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}
