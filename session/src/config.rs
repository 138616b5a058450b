use crate::error::ConfigError;
use std::env;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const API_KEY_VAR: &str = "GEMINI_API_KEY";
const BASE_URL_VAR: &str = "GEMINI_BASE_URL";
const POLL_MS_VAR: &str = "GEMINI_UPLOAD_POLL_MS";
const TIMEOUT_SECS_VAR: &str = "GEMINI_UPLOAD_TIMEOUT_SECS";

/// Settings for the Gemini client.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Delay between state checks while an uploaded file is processing.
    pub upload_poll_interval: Duration,
    /// How long to wait for an uploaded file to become active.
    pub upload_timeout: Duration,
}

impl Config {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            upload_poll_interval: Duration::from_secs(2),
            upload_timeout: Duration::from_secs(300),
        }
    }

    /// Reads the process environment. Loading `.env` is left to the binary.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_VAR)
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::Missing(API_KEY_VAR))?;

        let mut config = Self::new(api_key.trim());

        if let Some(base_url) = lookup(BASE_URL_VAR).filter(|v| !v.trim().is_empty()) {
            config.base_url = base_url.trim().trim_end_matches('/').to_string();
        }
        if let Some(ms) = lookup(POLL_MS_VAR) {
            config.upload_poll_interval = Duration::from_millis(parse_number(POLL_MS_VAR, &ms)?);
        }
        if let Some(secs) = lookup(TIMEOUT_SECS_VAR) {
            config.upload_timeout = Duration::from_secs(parse_number(TIMEOUT_SECS_VAR, &secs)?);
        }

        Ok(config)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

fn parse_number(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: value.to_string(),
    })
}
