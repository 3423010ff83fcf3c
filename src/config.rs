//! Client configuration

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Invalid config: {0}")]
    Parse(String),
}

/// Where the client runs. The Android emulator reaches the development host
/// through its own alias address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
    Desktop,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// GraphQL endpoint for queries and mutations.
    pub api_url: String,
    /// GraphQL endpoint for subscriptions.
    pub ws_url: String,
    /// Credential store key holding the bearer token.
    pub token_key: String,
    /// Events buffered per subscription before delivery waits.
    pub subscription_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::with_host("localhost")
    }
}

impl ClientConfig {
    fn with_host(host: &str) -> Self {
        Self {
            api_url: format!("http://{}:4000/", host),
            ws_url: format!("ws://{}:4000/", host),
            token_key: "bookmart/token".to_string(),
            subscription_buffer: 32,
        }
    }

    /// Development endpoints as seen from `platform`.
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Android => Self::with_host("10.0.2.2"),
            Platform::Ios | Platform::Desktop => Self::with_host("localhost"),
        }
    }

    /// Read a JSON config file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if config.subscription_buffer == 0 {
            return Err(ConfigError::Parse("subscription_buffer must be positive".into()));
        }
        Ok(config)
    }

    /// Apply `BOOKMART_API_URL`, `BOOKMART_WS_URL` and `BOOKMART_TOKEN_KEY`.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("BOOKMART_API_URL") {
            self.api_url = url;
        }
        if let Some(url) = lookup("BOOKMART_WS_URL") {
            self.ws_url = url;
        }
        if let Some(key) = lookup("BOOKMART_TOKEN_KEY") {
            self.token_key = key;
        }
        self
    }
}
