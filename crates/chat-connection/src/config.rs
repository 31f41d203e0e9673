//! Client configuration.
//!
//! Reads `<config dir>/chatlink/config.json`; every field is optional and
//! `CHATLINK_ENV` / `CHATLINK_URL` override the file.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use chatlink_protocol::constants::{CHAT_ENDPOINT_PATH, RECONNECT_DELAY, TOKEN_QUERY_PARAM};

/// Errors from loading configuration or building the endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),
}

/// Deployment environment selecting the server URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(ConfigError::UnknownEnvironment(other.to_string())),
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub environment: Environment,
    /// Server base URL used in development.
    pub development_url: String,
    /// Server base URL used in production.
    pub production_url: String,
    /// Delay before an automatic reconnect attempt.
    pub reconnect_delay_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            development_url: "http://localhost:8080".into(),
            production_url: "https://chat.chatlink.app".into(),
            reconnect_delay_ms: RECONNECT_DELAY.as_millis() as u64,
        }
    }
}

impl ChatConfig {
    /// Loads the config file from the default location, then applies
    /// environment overrides. A missing or unparsable file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match config_path() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Loads the config from `path` without environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str::<ChatConfig>(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config, using defaults"
                );
                Ok(Self::default())
            }
        }
    }

    /// Applies `CHATLINK_ENV` and `CHATLINK_URL`.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(env) = std::env::var("CHATLINK_ENV") {
            self.environment = env.parse()?;
        }
        if let Ok(url) = std::env::var("CHATLINK_URL") {
            self.set_base_url(url);
        }
        Ok(())
    }

    /// Overrides the base URL of the active environment.
    pub fn set_base_url(&mut self, url: impl Into<String>) {
        match self.environment {
            Environment::Development => self.development_url = url.into(),
            Environment::Production => self.production_url = url.into(),
        }
    }

    /// Base URL of the active environment.
    pub fn base_url(&self) -> &str {
        match self.environment {
            Environment::Development => &self.development_url,
            Environment::Production => &self.production_url,
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Builds the chat endpoint for the active environment.
    pub fn endpoint(&self) -> Result<Endpoint, ConfigError> {
        Endpoint::parse(self.base_url())
    }
}

/// The chat WebSocket endpoint, without credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
}

impl Endpoint {
    /// Parses a server base URL. `http`/`https` become `ws`/`wss` and the
    /// chat path is appended to any existing path prefix.
    pub fn parse(base: &str) -> Result<Self, ConfigError> {
        let base = base.trim();
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };

        let mut url = Url::parse(&ws_base)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::UnsupportedScheme(url.scheme().to_string()));
        }

        let prefix = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{prefix}{CHAT_ENDPOINT_PATH}"));
        url.set_query(None);
        url.set_fragment(None);
        Ok(Self { url })
    }

    /// Endpoint URL carrying `token` as a query parameter.
    pub fn url_with_token(&self, token: &str) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair(TOKEN_QUERY_PARAM, token);
        url
    }

    /// `host[:port]` for the STOMP `host` header.
    pub fn host(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    pub fn as_url(&self) -> &Url {
        &self.url
    }
}

/// Returns the config file path.
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("chatlink").join("config.json"))
}

/// Returns the platform-specific config directory.
pub(crate) fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(".config"))
    }
}
