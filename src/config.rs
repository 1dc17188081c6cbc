use secrecy::{ExposeSecret, SecretBox};
use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid API key format for {service}: {reason}")]
    InvalidKeyFormat { service: String, reason: String },
    #[error("Environment error: {0}")]
    EnvError(#[from] env::VarError),
}

/// Configuration for API services
#[derive(Debug)]
pub struct ApiConfig {
    pub openai_key: SecretBox<String>,
}

impl ApiConfig {
    /// Load API configuration from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (for development)
        dotenvy::dotenv().ok(); // Don't error if .env doesn't exist

        let openai_key = load_api_key("OPENAI_API_KEY", "OpenAI")?;

        Ok(Self { openai_key })
    }

    /// Get OpenAI API key (use only when making API calls)
    pub fn openai_key(&self) -> &str {
        self.openai_key.expose_secret()
    }
}

/// Credentials and endpoints for the avatar video pipeline
#[derive(Debug)]
pub struct VideoCredentials {
    pub fal_key: SecretBox<String>,
    pub storage_key: SecretBox<String>,
    /// Base URL for uploads, e.g. https://host/storage/v1/object/avatar-audio
    pub storage_upload_url: String,
    /// Base URL the uploaded objects are served from
    pub storage_public_url: String,
}

impl VideoCredentials {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            fal_key: load_api_key("FAL_API_KEY", "fal.ai")?,
            storage_key: load_api_key("STORAGE_API_KEY", "Object storage")?,
            storage_upload_url: require_var("STORAGE_UPLOAD_URL")?,
            storage_public_url: require_var("STORAGE_PUBLIC_URL")?,
        })
    }

    pub fn fal_key(&self) -> &str {
        self.fal_key.expose_secret()
    }

    pub fn storage_key(&self) -> &str {
        self.storage_key.expose_secret()
    }
}

/// Credentials for LiveKit token issuance
#[derive(Debug)]
pub struct LiveKitCredentials {
    pub api_key: SecretBox<String>,
    pub api_secret: SecretBox<String>,
    pub url: String,
}

impl LiveKitCredentials {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            api_key: load_api_key("LIVEKIT_API_KEY", "LiveKit")?,
            api_secret: load_api_key("LIVEKIT_API_SECRET", "LiveKit")?,
            url: require_var("LIVEKIT_URL")?,
        })
    }

    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    pub fn api_secret(&self) -> &str {
        self.api_secret.expose_secret()
    }
}

/// Tunables for the video generation pipeline. The defaults mirror the
/// provider limits: 600 characters keeps synthesized audio under the
/// 60-second cap, and 18 polls at 5 seconds gives a ~90 second ceiling.
#[derive(Debug, Clone)]
pub struct VideoConfig {
    pub script_max_chars: usize,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub resolution: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            script_max_chars: 600,
            poll_interval: Duration::from_secs(5),
            max_poll_attempts: 18,
            resolution: "480p".to_string(),
        }
    }
}

/// Load and validate a single API key from environment
fn load_api_key(env_var: &str, service_name: &str) -> Result<SecretBox<String>, ConfigError> {
    let key = env::var(env_var).map_err(|_| ConfigError::MissingEnvVar(env_var.to_string()))?;

    if key.trim().is_empty() {
        return Err(ConfigError::InvalidKeyFormat {
            service: service_name.to_string(),
            reason: "API key cannot be empty".to_string(),
        });
    }

    validate_key_format(&key, service_name)?;

    Ok(SecretBox::new(Box::new(key)))
}

/// Validate API key format for each service
fn validate_key_format(key: &str, service: &str) -> Result<(), ConfigError> {
    match service {
        "OpenAI" => {
            // OpenAI keys start with "sk-"
            if !key.starts_with("sk-") {
                return Err(ConfigError::InvalidKeyFormat {
                    service: service.to_string(),
                    reason: "OpenAI keys should start with 'sk-'".to_string(),
                });
            }
        }
        "fal.ai" => {
            // fal keys are "<id>:<secret>" pairs
            if !key.contains(':') {
                return Err(ConfigError::InvalidKeyFormat {
                    service: service.to_string(),
                    reason: "fal.ai keys should be 'key_id:key_secret'".to_string(),
                });
            }
        }
        _ => {} // No validation for other services
    }
    Ok(())
}

fn require_var(env_var: &str) -> Result<String, ConfigError> {
    let value = env::var(env_var).map_err(|_| ConfigError::MissingEnvVar(env_var.to_string()))?;
    if value.trim().is_empty() {
        return Err(ConfigError::MissingEnvVar(env_var.to_string()));
    }
    Ok(value)
}

/// Load configuration with helpful error messages for development
pub fn load_config() -> Result<ApiConfig, ConfigError> {
    match ApiConfig::load() {
        Ok(config) => {
            log::info!("Successfully loaded API configuration");
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
