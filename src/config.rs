// Runtime configuration, read from the environment (and `.env`, if present).

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::{Result, TrackerError};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Directory holding the route CSV files served to the front-end.
    pub data_dir: PathBuf,
    /// Route files the update endpoint may rewrite.
    pub allowed_files: Vec<String>,
    pub openai_api_key: Option<String>,
    pub speech_api_url: String,
    pub speech_model: String,
    pub speech_voice: String,
    pub openweather_api_key: Option<String>,
    pub weather_api_url: String,
    pub request_timeout: Duration,
}

impl Config {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;
    const DEFAULT_DATA_DIR: &'static str = "./public";
    const DEFAULT_ALLOWED_FILES: &'static str = "santa_route.csv,santa_route_test.csv";
    const DEFAULT_SPEECH_URL: &'static str = "https://api.openai.com/v1/audio/speech";
    const DEFAULT_SPEECH_MODEL: &'static str = "tts-1";
    const DEFAULT_SPEECH_VOICE: &'static str = "onyx";
    const DEFAULT_WEATHER_URL: &'static str = "https://api.openweathermap.org/data/2.5/weather";
    const DEFAULT_TIMEOUT_SECS: u64 = 30;

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| dotenvy::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let secret = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let port = match secret("SANTA_PORT") {
            Some(value) => value.parse::<u16>().map_err(|e| {
                TrackerError::ConfigError(format!("SANTA_PORT '{}' is not a port: {}", value, e))
            })?,
            None => Self::DEFAULT_PORT,
        };

        let timeout_secs = match secret("REQUEST_TIMEOUT_SECS") {
            Some(value) => value.parse::<u64>().map_err(|e| {
                TrackerError::ConfigError(format!(
                    "REQUEST_TIMEOUT_SECS '{}' is not a number of seconds: {}",
                    value, e
                ))
            })?,
            None => Self::DEFAULT_TIMEOUT_SECS,
        };

        let allowed_files: Vec<String> = text("SANTA_ALLOWED_FILES", Self::DEFAULT_ALLOWED_FILES)
            .split(',')
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();

        Ok(Config {
            host: text("SANTA_HOST", Self::DEFAULT_HOST),
            port,
            data_dir: PathBuf::from(text("SANTA_DATA_DIR", Self::DEFAULT_DATA_DIR)),
            allowed_files,
            openai_api_key: secret("OPENAI_API_KEY"),
            speech_api_url: text("SPEECH_API_URL", Self::DEFAULT_SPEECH_URL),
            speech_model: text("SPEECH_MODEL", Self::DEFAULT_SPEECH_MODEL),
            speech_voice: text("SPEECH_VOICE", Self::DEFAULT_SPEECH_VOICE),
            openweather_api_key: secret("OPENWEATHER_API_KEY"),
            weather_api_url: text("WEATHER_API_URL", Self::DEFAULT_WEATHER_URL),
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Only bare file names from the allow-list are accepted.
    pub fn is_allowed_file(&self, name: &str) -> bool {
        let is_bare = Path::new(name).file_name().is_some_and(|f| f == name);
        is_bare && self.allowed_files.iter().any(|allowed| allowed == name)
    }

    pub fn data_file(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }
}
