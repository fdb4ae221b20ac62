//! Relay configuration types.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default UDP port players connect to.
pub const DEFAULT_RELAY_PORT: u16 = 5520;

/// Largest payload a UDP datagram can carry.
pub const MAX_UDP_DATAGRAM: usize = 65535;

/// Configuration for the UDP relay engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address the inbound (player-facing) socket binds to.
    pub listen_addr: SocketAddr,

    /// SO_RCVBUF applied to the inbound socket and every session socket.
    pub recv_buffer_size: usize,

    /// Size of the receive buffer used per read.
    pub max_datagram_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_RELAY_PORT),
            recv_buffer_size: 8 * 1024 * 1024, // 8MB
            max_datagram_size: MAX_UDP_DATAGRAM,
        }
    }
}

impl RelayConfig {
    /// Create a config listening on the given address.
    #[must_use]
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Self::default()
        }
    }

    /// Set the socket receive buffer size.
    #[must_use]
    pub fn with_recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size;
        self
    }

    /// Settings handed to the session registry.
    #[must_use]
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            recv_buffer_size: self.recv_buffer_size,
            max_datagram_size: self.max_datagram_size,
        }
    }
}

/// Per-session socket settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// SO_RCVBUF for the outbound socket.
    pub recv_buffer_size: usize,

    /// Read buffer size for the reply loop.
    pub max_datagram_size: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        RelayConfig::default().session_settings()
    }
}

/// Configuration for the external route-assignment service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Base URL of the service; `None` or empty disables resolution.
    pub base_url: Option<String>,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            base_url: Some("http://localhost:3001".to_string()),
            timeout_secs: 5,
        }
    }
}

impl ResolverConfig {
    /// Create a config pointing at the given base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..Self::default()
        }
    }

    /// A config with no service configured.
    #[must_use]
    pub fn unconfigured() -> Self {
        Self {
            base_url: None,
            ..Self::default()
        }
    }

    /// Base URL if one is set and non-empty.
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Request timeout as Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
