use crate::config::ApiConfig;
use crate::vad::SAMPLE_RATE;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum STTError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Audio format error: {0}")]
    AudioFormat(String),
    #[error("Response parsing error: {0}")]
    ParseError(String),
}

#[derive(Debug, Clone)]
pub struct STTConfig {
    pub language: Option<String>,
    pub server_timeout: Duration,
}

impl Default for STTConfig {
    fn default() -> Self {
        Self {
            language: None,
            server_timeout: Duration::from_secs(10),
        }
    }
}

/// Turns one complete utterance into text
#[async_trait::async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, samples: &[i16]) -> Result<String, STTError>;

    /// Short provider name for logs
    fn provider(&self) -> &'static str;
}

/// Wrap 16kHz mono PCM16 samples in a WAV container
pub fn encode_wav(samples: &[i16]) -> Result<Vec<u8>, STTError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| STTError::AudioFormat(e.to_string()))?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| STTError::AudioFormat(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| STTError::AudioFormat(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, STTError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(STTError::ApiError {
        status: status.as_u16(),
        message,
    })
}

#[derive(Debug, Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(Debug, Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(Debug, Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(Debug, Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

fn parse_deepgram(body: &str) -> Result<String, STTError> {
    let response: DeepgramResponse = serde_json::from_str(body)
        .map_err(|e| STTError::ParseError(format!("Invalid JSON: {}", e)))?;

    Ok(response
        .results
        .channels
        .first()
        .and_then(|channel| channel.alternatives.first())
        .map(|alt| alt.transcript.trim().to_string())
        .unwrap_or_default())
}

/// Deepgram pre-recorded transcription
pub struct DeepgramSTT {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    config: STTConfig,
}

impl DeepgramSTT {
    pub fn new(api_key: String, config: STTConfig) -> Result<Self, STTError> {
        let client = Client::builder().timeout(config.server_timeout).build()?;
        Ok(Self {
            client,
            api_key,
            base_url: "https://api.deepgram.com/v1".to_string(),
            model: "nova-3".to_string(),
            config,
        })
    }
}

#[async_trait::async_trait]
impl SpeechToText for DeepgramSTT {
    async fn transcribe(&self, samples: &[i16]) -> Result<String, STTError> {
        let wav = encode_wav(samples)?;

        let mut query = vec![
            ("model", self.model.clone()),
            ("smart_format", "true".to_string()),
        ];
        if let Some(ref language) = self.config.language {
            query.push(("language", language.clone()));
        }

        let response = self
            .client
            .post(format!("{}/listen", self.base_url))
            .query(&query)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "audio/wav")
            .body(wav)
            .send()
            .await?;

        let body = check_status(response).await?.text().await?;
        parse_deepgram(&body)
    }

    fn provider(&self) -> &'static str {
        "deepgram"
    }
}

#[derive(Debug, Deserialize)]
struct WhisperResponse {
    text: String,
}

/// OpenAI Whisper transcription
pub struct WhisperSTT {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    config: STTConfig,
}

impl WhisperSTT {
    pub fn new(api_key: String, config: STTConfig) -> Result<Self, STTError> {
        let client = Client::builder().timeout(config.server_timeout).build()?;
        Ok(Self {
            client,
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "whisper-1".to_string(),
            config,
        })
    }
}

#[async_trait::async_trait]
impl SpeechToText for WhisperSTT {
    async fn transcribe(&self, samples: &[i16]) -> Result<String, STTError> {
        let wav = encode_wav(samples)?;

        let file = Part::bytes(wav)
            .file_name("utterance.wav")
            .mime_str("audio/wav")?;
        let mut form = Form::new()
            .text("model", self.model.clone())
            .text("response_format", "json")
            .part("file", file);
        if let Some(ref language) = self.config.language {
            form = form.text("language", language.clone());
        }

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await?;

        let body = check_status(response).await?.text().await?;
        let parsed: WhisperResponse = serde_json::from_str(&body)
            .map_err(|e| STTError::ParseError(format!("Invalid JSON: {}", e)))?;
        Ok(parsed.text.trim().to_string())
    }

    fn provider(&self) -> &'static str {
        "whisper"
    }
}

/// Deepgram when a key is configured, otherwise OpenAI Whisper
pub fn create_stt(config: &ApiConfig) -> Result<Arc<dyn SpeechToText>, STTError> {
    if let Some(key) = config.deepgram_key() {
        match DeepgramSTT::new(key.to_string(), STTConfig::default()) {
            Ok(stt) => {
                log::info!("🎤 Using Deepgram STT");
                return Ok(Arc::new(stt));
            }
            Err(e) => {
                log::warn!(
                    "Failed to initialize Deepgram STT: {}. Falling back to OpenAI Whisper",
                    e
                );
            }
        }
    }

    log::info!("🎤 Using OpenAI Whisper STT");
    Ok(Arc::new(WhisperSTT::new(
        config.openai_key().to_string(),
        STTConfig::default(),
    )?))
}
