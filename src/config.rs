use secrecy::{ExposeSecret, SecretBox};
use std::env;
use thiserror::Error;

const OPENAI_KEY_VAR: &str = "OPENAI_API_KEY";
const DEEPGRAM_KEY_VAR: &str = "DEEPGRAM_API_KEY";
const ELEVENLABS_KEY_VAR: &str = "ELEVEN_API_KEY";

const DEFAULT_LISTEN: &str = "0.0.0.0:8765";
const DEFAULT_AGENT_NAME: &str = "echo";
const DEFAULT_ROOM_NAME: &str = "story-room";
const DEFAULT_HEALTH_PORT: u16 = 8081;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid API key format for {service}: {reason}")]
    InvalidKeyFormat { service: String, reason: String },
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: String, reason: String },
}

/// Provider credentials
#[derive(Debug)]
pub struct ApiConfig {
    pub openai_key: SecretBox<String>,
    pub deepgram_key: Option<SecretBox<String>>,
    pub elevenlabs_key: Option<SecretBox<String>>,
}

impl ApiConfig {
    /// Load API configuration from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (for development)
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Read credentials from the current process environment only
    pub fn from_env() -> Result<Self, ConfigError> {
        let openai_key = Self::load_api_key(OPENAI_KEY_VAR, "OpenAI")?;

        let deepgram_key = match Self::load_api_key(DEEPGRAM_KEY_VAR, "Deepgram") {
            Ok(key) => Some(key),
            Err(ConfigError::MissingEnvVar(_)) => {
                log::warn!(
                    "{} not set, speech-to-text falls back to OpenAI Whisper",
                    DEEPGRAM_KEY_VAR
                );
                None
            }
            Err(e) => return Err(e),
        };

        let elevenlabs_key = match Self::load_api_key(ELEVENLABS_KEY_VAR, "ElevenLabs") {
            Ok(key) => Some(key),
            Err(ConfigError::MissingEnvVar(_)) => {
                log::warn!(
                    "{} not set, sessions will run without synthesized audio",
                    ELEVENLABS_KEY_VAR
                );
                None
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            openai_key,
            deepgram_key,
            elevenlabs_key,
        })
    }

    /// Load a single API key from environment. Format problems are logged, not fatal.
    fn load_api_key(env_var: &str, service_name: &str) -> Result<SecretBox<String>, ConfigError> {
        let key = env::var(env_var).map_err(|_| ConfigError::MissingEnvVar(env_var.to_string()))?;

        if key.trim().is_empty() {
            return Err(ConfigError::MissingEnvVar(env_var.to_string()));
        }

        if let Err(e) = Self::validate_key_format(&key, service_name) {
            log::warn!("{}", e);
        }

        Ok(SecretBox::new(Box::new(key)))
    }

    /// Validate API key format for each service
    fn validate_key_format(key: &str, service: &str) -> Result<(), ConfigError> {
        match service {
            "OpenAI" => {
                if !key.starts_with("sk-") {
                    return Err(ConfigError::InvalidKeyFormat {
                        service: service.to_string(),
                        reason: "OpenAI keys should start with 'sk-'".to_string(),
                    });
                }
            }
            "ElevenLabs" => {
                if !key.starts_with("sk_") {
                    return Err(ConfigError::InvalidKeyFormat {
                        service: service.to_string(),
                        reason: "ElevenLabs keys should start with 'sk_'".to_string(),
                    });
                }
            }
            _ => {} // No validation for unknown services
        }
        Ok(())
    }

    /// Get OpenAI API key (use only when making API calls)
    pub fn openai_key(&self) -> &str {
        self.openai_key.expose_secret()
    }

    pub fn deepgram_key(&self) -> Option<&str> {
        self.deepgram_key.as_ref().map(|k| k.expose_secret().as_str())
    }

    pub fn elevenlabs_key(&self) -> Option<&str> {
        self.elevenlabs_key.as_ref().map(|k| k.expose_secret().as_str())
    }
}

/// Everything the host process needs besides provider credentials
#[derive(Debug)]
pub struct AgentSettings {
    pub listen_address: String,
    pub session_key: Option<SecretBox<String>>,
    pub agent_name: String,
    pub room_name: String,
    pub health_port: u16,
}

impl AgentSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let health_port = match non_empty_var("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                var: "PORT".to_string(),
                reason: e.to_string(),
            })?,
            None => DEFAULT_HEALTH_PORT,
        };

        Ok(Self {
            listen_address: non_empty_var("STORY_AGENT_LISTEN")
                .unwrap_or_else(|| DEFAULT_LISTEN.to_string()),
            session_key: non_empty_var("STORY_AGENT_API_KEY")
                .map(|key| SecretBox::new(Box::new(key))),
            agent_name: non_empty_var("AGENT_NAME")
                .unwrap_or_else(|| DEFAULT_AGENT_NAME.to_string()),
            room_name: non_empty_var("ROOM_NAME").unwrap_or_else(|| DEFAULT_ROOM_NAME.to_string()),
            health_port,
        })
    }

    pub fn session_key(&self) -> Option<&str> {
        self.session_key.as_ref().map(|k| k.expose_secret().as_str())
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Load configuration with helpful error messages for development
pub fn load_config() -> Result<(ApiConfig, AgentSettings), ConfigError> {
    let result = ApiConfig::load().and_then(|api| Ok((api, AgentSettings::from_env()?)));
    match result {
        Ok(config) => {
            log::info!("Successfully loaded configuration");
            Ok(config)
        }
        Err(ConfigError::MissingEnvVar(var)) => {
            log::error!("Missing required environment variable: {}", var);
            log::error!("Create a .env file in the project root with:");
            log::error!("{}=your_api_key_here", var);
            Err(ConfigError::MissingEnvVar(var))
        }
        Err(e) => {
            log::error!("Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Outcome of a pre-flight environment check
#[derive(Debug, Default)]
pub struct CheckReport {
    pub ci: bool,
    pub missing_required: Vec<&'static str>,
    pub missing_optional: Vec<&'static str>,
    pub format_warnings: Vec<String>,
}

impl CheckReport {
    /// In CI missing keys are tolerated; keys that are present must still be well formed
    pub fn passed(&self) -> bool {
        (self.ci || self.missing_required.is_empty()) && self.format_warnings.is_empty()
    }
}

pub fn is_ci() -> bool {
    env::var_os("CI").is_some() || env::var_os("GITHUB_ACTIONS").is_some()
}

/// Validate the environment the way a deployment would see it
pub fn check_environment() -> CheckReport {
    let ci = is_ci();
    if !ci {
        dotenvy::dotenv().ok();
    }

    let mut report = CheckReport {
        ci,
        ..Default::default()
    };

    for (var, service, required) in [
        (OPENAI_KEY_VAR, "OpenAI", true),
        (DEEPGRAM_KEY_VAR, "Deepgram", false),
        (ELEVENLABS_KEY_VAR, "ElevenLabs", false),
    ] {
        match non_empty_var(var) {
            Some(key) => {
                if let Err(e) = ApiConfig::validate_key_format(&key, service) {
                    report.format_warnings.push(e.to_string());
                }
            }
            None if required => report.missing_required.push(var),
            None => report.missing_optional.push(var),
        }
    }

    if let Err(e) = AgentSettings::from_env() {
        report.format_warnings.push(e.to_string());
    }

    report
}
