use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("FACECHECK_API_KEY is not set; the recognition service requires a key")]
    MissingApiKey,
}

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite state database.
    pub db_path: PathBuf,
    /// API key for the recognition service.
    pub api_key: String,
    /// Model identifier for the recognition service.
    pub model: String,
    /// Base URL of the recognition API.
    pub api_base_url: String,
    /// Timeout in seconds for one recognition call.
    pub recognize_timeout_secs: u64,
    /// Upper bound on a submitted image, in bytes.
    pub max_image_bytes: usize,
}

impl Config {
    /// Load configuration from `FACECHECK_*` environment variables with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facecheck");

        let db_path = std::env::var("FACECHECK_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("state.db"));

        let api_key = std::env::var("FACECHECK_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        Ok(Self {
            db_path,
            api_key,
            model: std::env::var("FACECHECK_MODEL")
                .unwrap_or_else(|_| "gemini-2.0-flash".to_string()),
            api_base_url: std::env::var("FACECHECK_API_BASE_URL")
                .unwrap_or_else(|_| facecheck_recognizer::DEFAULT_API_BASE.to_string()),
            recognize_timeout_secs: env_u64("FACECHECK_RECOGNIZE_TIMEOUT_SECS", 30),
            max_image_bytes: env_usize("FACECHECK_MAX_IMAGE_BYTES", 8 * 1024 * 1024),
        })
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
