//! Server configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Port used when nothing else is configured.
pub const DEFAULT_PORT: u16 = 3000;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub listen_addr: SocketAddr,

    /// Maximum concurrent client sessions.
    pub max_sessions: usize,

    /// Time allowed for the WebSocket upgrade.
    pub handshake_timeout: Duration,

    /// How long handler tasks may keep running after their session ended
    /// before they are aborted.
    pub handler_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_sessions: 100,
            handshake_timeout: Duration::from_secs(10),
            handler_grace: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// Creates a configuration listening on `listen_addr`.
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    /// Builder: set max sessions.
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Builder: set handshake timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Builder: set handler grace period.
    pub fn with_handler_grace(mut self, grace: Duration) -> Self {
        self.handler_grace = grace;
        self
    }
}

/// `127.0.0.1:3000`.
pub fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr.to_string(), "127.0.0.1:3000");
        assert_eq!(config.max_sessions, 100);
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
        assert_eq!(config.handler_grace, Duration::from_secs(5));
    }

    #[test]
    fn custom_config() {
        let addr: SocketAddr = "0.0.0.0:8080".parse().unwrap();
        let config = ServerConfig::new(addr)
            .with_max_sessions(4)
            .with_handshake_timeout(Duration::from_secs(1))
            .with_handler_grace(Duration::from_millis(250));

        assert_eq!(config.listen_addr, addr);
        assert_eq!(config.max_sessions, 4);
        assert_eq!(config.handshake_timeout, Duration::from_secs(1));
        assert_eq!(config.handler_grace, Duration::from_millis(250));
    }
}
