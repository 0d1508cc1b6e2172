//! File configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/remolacha/config.toml` by default:
//!
//! ```toml
//! [server]
//! listen = "127.0.0.1:3000"
//! max_sessions = 100
//!
//! [client]
//! url = "ws://127.0.0.1:3000"
//! reconnect_delay_ms = 1000
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use remolacha_server::{ServerConfig, default_listen_addr};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};
use crate::transport::{DEFAULT_URL, TransportConfig};

/// Configuration for the `remolacha` binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Debug mode.
    pub debug: bool,

    /// Settings used by `remolacha serve`.
    pub server: ServerSettings,

    /// Settings used when talking to a server.
    pub client: ClientSettings,
}

/// Server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to listen on.
    pub listen: SocketAddr,

    /// Maximum concurrent sessions.
    pub max_sessions: usize,

    /// Grace period for handlers after their session ended, in milliseconds.
    pub handler_grace_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
            max_sessions: 100,
            handler_grace_ms: 5000,
        }
    }
}

/// Client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// WebSocket URL of the server.
    pub url: String,

    /// Pause between reconnect attempts, in milliseconds.
    pub reconnect_delay_ms: u64,

    /// Timeout for one-shot calls, in seconds.
    pub timeout: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            reconnect_delay_ms: 1000,
            timeout: 10,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from the default path, or defaults if missing.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| ClientError::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("remolacha")
    }

    /// Checks values that parse but cannot work.
    pub fn validate(&self) -> ClientResult<()> {
        let url = url::Url::parse(&self.client.url)
            .map_err(|e| ClientError::Config(format!("invalid client.url: {}", e)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ClientError::Config(format!(
                "client.url must use ws:// or wss://, got {}://",
                url.scheme()
            )));
        }
        if self.server.max_sessions == 0 {
            return Err(ClientError::Config(
                "server.max_sessions must be at least 1".into(),
            ));
        }
        if self.client.reconnect_delay_ms == 0 {
            return Err(ClientError::Config(
                "client.reconnect_delay_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::new(self.server.listen)
            .with_max_sessions(self.server.max_sessions)
            .with_handler_grace(Duration::from_millis(self.server.handler_grace_ms))
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig::new(self.client.url.clone())
            .with_reconnect_delay(Duration::from_millis(self.client.reconnect_delay_ms))
    }

    /// Call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.client.timeout)
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> ClientResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ClientError::Config(format!("failed to serialize config: {}", e)))
    }
}
