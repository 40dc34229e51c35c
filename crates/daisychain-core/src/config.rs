//! Centralized configuration for the DaisyChain host and client.
//!
//! Compile-time defaults live on [`HostDefaults`]; [`HostConfig`] and
//! [`ClientConfig`] carry the runtime values and start from those defaults.

use crate::{DaisyError, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Protocol and transport defaults.
pub struct HostDefaults;

impl HostDefaults {
    pub const HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
    pub const PORT: u16 = 65432;
    pub const BOOTSTRAP_COMMAND: &'static str = "daisychain_init";
    pub const ANCHOR_TYPE: &'static str = "Root";

    // The host loop used to run off a 500ms UI timer; a dedicated thread can tick much faster.
    pub const TICK_INTERVAL: Duration = Duration::from_millis(25);
    pub const READ_BUFFER_SIZE: usize = 16 * 1024;
    pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
    pub const MAX_CONNECTIONS: usize = 64;
    // A connection that moves no bytes for this long, such as one stopped mid-document, is closed.
    pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30);
    pub const MAX_EVENTS: usize = 128;

    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);
}

/// How message boundaries are found on a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Framing {
    /// No prefix or delimiter: one JSON document per message.
    #[default]
    Raw,
    /// 4-byte big-endian length followed by the payload.
    LengthPrefixed,
}

impl Framing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Framing::Raw => "raw",
            Framing::LengthPrefixed => "length-prefixed",
        }
    }
}

impl std::str::FromStr for Framing {
    type Err = DaisyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "raw" => Ok(Framing::Raw),
            "length-prefixed" | "length_prefixed" | "prefixed" => Ok(Framing::LengthPrefixed),
            other => Err(DaisyError::Config {
                message: format!("unknown framing '{}', expected 'raw' or 'length-prefixed'", other),
            }),
        }
    }
}

impl std::fmt::Display for Framing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Runtime configuration of the host loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub addr: SocketAddr,
    pub tick_interval: Duration,
    pub read_buffer_size: usize,
    pub max_message_size: usize,
    pub max_connections: usize,
    pub idle_timeout: Duration,
    pub framing: Framing,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::new(HostDefaults::HOST, HostDefaults::PORT),
            tick_interval: HostDefaults::TICK_INTERVAL,
            read_buffer_size: HostDefaults::READ_BUFFER_SIZE,
            max_message_size: HostDefaults::MAX_MESSAGE_SIZE,
            max_connections: HostDefaults::MAX_CONNECTIONS,
            idle_timeout: HostDefaults::IDLE_TIMEOUT,
            framing: Framing::Raw,
        }
    }
}

impl HostConfig {
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    /// Reject values the host loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.read_buffer_size == 0 {
            return Err(DaisyError::Config {
                message: "read_buffer_size must be greater than zero".to_string(),
            });
        }
        if self.max_message_size < self.read_buffer_size {
            return Err(DaisyError::Config {
                message: format!(
                    "max_message_size ({}) must be at least read_buffer_size ({})",
                    self.max_message_size, self.read_buffer_size
                ),
            });
        }
        if self.max_connections == 0 {
            return Err(DaisyError::Config {
                message: "max_connections must be greater than zero".to_string(),
            });
        }
        if self.idle_timeout.is_zero() {
            return Err(DaisyError::Config {
                message: "idle_timeout must be greater than zero".to_string(),
            });
        }
        if !self.addr.ip().is_loopback() {
            tracing::warn!(
                "Host configured on non-loopback address {}; the bridge has no authentication",
                self.addr
            );
        }
        Ok(())
    }
}

/// Runtime configuration of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub addr: SocketAddr,
    pub framing: Framing,
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
    pub read_buffer_size: usize,
    pub max_message_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::new(HostDefaults::HOST, HostDefaults::PORT),
            framing: Framing::Raw,
            connect_timeout: HostDefaults::CONNECT_TIMEOUT,
            response_timeout: HostDefaults::RESPONSE_TIMEOUT,
            read_buffer_size: HostDefaults::READ_BUFFER_SIZE,
            max_message_size: HostDefaults::MAX_MESSAGE_SIZE,
        }
    }
}

impl ClientConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            ..Self::default()
        }
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framing_roundtrip() {
        for framing in [Framing::Raw, Framing::LengthPrefixed] {
            let parsed: Framing = framing.as_str().parse().expect("Should parse");
            assert_eq!(framing, parsed);
        }
        assert!("carrier-pigeon".parse::<Framing>().is_err());
    }

    #[test]
    fn test_defaults_are_loopback() {
        let config = HostConfig::default();
        assert!(config.addr.ip().is_loopback());
        assert_eq!(config.addr.port(), 65432);
        assert_eq!(config.framing, Framing::Raw);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_small_message_limit() {
        let config = HostConfig::default()
            .with_read_buffer_size(4096)
            .with_max_message_size(1024);
        assert!(config.validate().is_err());

        let config = HostConfig::default().with_read_buffer_size(0);
        assert!(config.validate().is_err());

        let config = HostConfig::default().with_idle_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
