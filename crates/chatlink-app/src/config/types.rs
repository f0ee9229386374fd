//! Configuration types for chatlink
//!
//! Defines `Settings` and its sections, plus the conversions into the
//! session and REST client options.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use chatlink_core::prelude::*;
use chatlink_net::{ReconnectPolicy, SessionOptions};

/// Global application settings (`config.toml`)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub auth: AuthSettings,
}

/// Backend location
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Use wss/https instead of ws/http
    #[serde(default)]
    pub secure: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            secure: false,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

impl ServerSettings {
    fn url(&self, scheme: &str, path: &str) -> Result<Url> {
        let raw = format!("{scheme}://{}:{}/{path}", self.host, self.port);
        Url::parse(&raw).map_err(|e| Error::config(format!("invalid server address {raw}: {e}")))
    }

    /// Chat socket endpoint, without the token.
    pub fn socket_url(&self) -> Result<Url> {
        self.url(if self.secure { "wss" } else { "ws" }, "ws/chat/")
    }

    /// REST API root.
    pub fn api_url(&self) -> Result<Url> {
        self.url(if self.secure { "https" } else { "http" }, "api/")
    }
}

/// Session behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionSettings {
    /// History records requested per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Reconnect automatically after an unexpected disconnect
    #[serde(default)]
    pub auto_reconnect: bool,

    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            auto_reconnect: false,
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

fn default_page_size() -> usize {
    crate::conversation::PAGE_SIZE
}

fn default_max_reconnect_attempts() -> u32 {
    chatlink_net::supervisor::DEFAULT_MAX_RECONNECT_ATTEMPTS
}

/// Authentication behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthSettings {
    /// Seconds between background token refreshes
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Keep the refresh token on disk for silent login
    #[serde(default = "default_true")]
    pub remember_me: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            remember_me: true,
        }
    }
}

impl AuthSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }
}

fn default_refresh_interval_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

impl Settings {
    /// Session options derived from `[server]` and `[session]`.
    pub fn session_options(&self) -> Result<SessionOptions> {
        let reconnect = ReconnectPolicy {
            enabled: self.session.auto_reconnect,
            max_attempts: self.session.max_reconnect_attempts,
            ..ReconnectPolicy::default()
        };
        Ok(SessionOptions::new(self.server.socket_url()?)?.with_reconnect(reconnect))
    }

    pub fn api_url(&self) -> Result<Url> {
        self.server.api_url()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_urls() {
        let settings = Settings::default();
        assert_eq!(
            settings.server.socket_url().unwrap().as_str(),
            "ws://127.0.0.1:8000/ws/chat/"
        );
        assert_eq!(settings.api_url().unwrap().as_str(), "http://127.0.0.1:8000/api/");
    }

    #[test]
    fn test_secure_urls() {
        let server = ServerSettings {
            host: "chat.example.com".into(),
            port: 443,
            secure: true,
        };
        // Default ports are dropped by the URL parser.
        assert_eq!(server.socket_url().unwrap().as_str(), "wss://chat.example.com/ws/chat/");
        assert_eq!(server.api_url().unwrap().as_str(), "https://chat.example.com/api/");
    }

    #[test]
    fn test_invalid_host_is_config_error() {
        let server = ServerSettings {
            host: "bad host".into(),
            ..ServerSettings::default()
        };
        assert!(matches!(server.socket_url(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_session_options_carry_reconnect_settings() {
        let mut settings = Settings::default();
        settings.session.auto_reconnect = true;
        settings.session.max_reconnect_attempts = 3;
        let options = settings.session_options().unwrap();
        assert!(options.reconnect.enabled);
        assert_eq!(options.reconnect.max_attempts, 3);
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.session.page_size, 50);
        assert!(!settings.session.auto_reconnect);
        assert_eq!(settings.auth.refresh_interval(), Duration::from_secs(300));
        assert!(settings.auth.remember_me);
    }

    #[test]
    fn test_partial_section_deserializes() {
        let settings: Settings = toml::from_str("[server]\nport = 9000\n").unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "127.0.0.1");
    }
}
