use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TTSError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Nothing to synthesize")]
    EmptyText,
}

#[derive(Debug, Clone)]
pub struct TTSConfig {
    pub voice_id: String,
    pub model: String,
    /// ElevenLabs output format; session audio is raw 16kHz PCM16
    pub output_format: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
}

impl Default for TTSConfig {
    fn default() -> Self {
        Self {
            voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(), // Rachel voice
            model: "eleven_multilingual_v2".to_string(),
            output_format: "pcm_16000".to_string(),
            stability: 0.5,
            similarity_boost: 0.75,
            style: 0.0,
            use_speaker_boost: true,
        }
    }
}

/// Turns agent text into audio for the participant
#[async_trait::async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Returns 16kHz mono PCM16 little-endian bytes
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, TTSError>;
}

pub struct ElevenLabsTTS {
    client: Client,
    api_key: String,
    base_url: String,
    config: TTSConfig,
}

impl ElevenLabsTTS {
    pub fn new(api_key: String) -> Result<Self, TTSError> {
        Self::with_config(api_key, TTSConfig::default())
    }

    pub fn with_config(api_key: String, config: TTSConfig) -> Result<Self, TTSError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            api_key,
            base_url: "https://api.elevenlabs.io/v1".to_string(),
            config,
        })
    }

    fn payload(&self, text: &str) -> serde_json::Value {
        json!({
            "text": text,
            "model_id": self.config.model,
            "voice_settings": {
                "stability": self.config.stability,
                "similarity_boost": self.config.similarity_boost,
                "style": self.config.style,
                "use_speaker_boost": self.config.use_speaker_boost
            }
        })
    }
}

#[async_trait::async_trait]
impl TextToSpeech for ElevenLabsTTS {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, TTSError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TTSError::EmptyText);
        }

        let url = format!("{}/text-to-speech/{}", self.base_url, self.config.voice_id);

        let response = self
            .client
            .post(&url)
            .query(&[("output_format", self.config.output_format.as_str())])
            .header("xi-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&self.payload(text))
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TTSError::ApiError {
                status: status.as_u16(),
                message: error_text,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_outputs_session_pcm() {
        let config = TTSConfig::default();
        assert_eq!(config.output_format, "pcm_16000");
        assert_eq!(config.model, "eleven_multilingual_v2");
    }

    #[test]
    fn test_payload_carries_voice_settings() {
        let tts = ElevenLabsTTS::new("sk_test".to_string()).unwrap();
        let payload = tts.payload("Once upon a time");
        assert_eq!(payload["text"], "Once upon a time");
        assert_eq!(payload["voice_settings"]["use_speaker_boost"], true);
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected_without_request() {
        let tts = ElevenLabsTTS::new("sk_test".to_string()).unwrap();
        assert!(matches!(tts.synthesize("  ").await, Err(TTSError::EmptyText)));
    }
}
