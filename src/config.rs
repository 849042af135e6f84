//! Server configuration parsed from environment variables.
//!
//! Numeric knobs fall back to their defaults when absent or unparsable.
//! A malformed bind address or a zero channel capacity is a startup error.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BIND_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
pub const DEFAULT_CLIENT_CHANNEL_CAPACITY: usize = 256;
pub const DEFAULT_ROOM: &str = "default";

/// `RUST_LOG` filter used when the variable is unset.
pub const DEFAULT_LOG_FILTER: &str = "drawboard=info,tower_http=info";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid BIND_ADDR: {0}")]
    InvalidBindAddr(String),
    #[error("CLIENT_CHANNEL_CAPACITY must be at least 1")]
    ZeroChannelCapacity,
    #[error("DEFAULT_ROOM must not be empty")]
    EmptyDefaultRoom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
    /// Bound of each connection's outbound frame queue.
    pub client_channel_capacity: usize,
    /// Room joined when the websocket URL names none.
    pub default_room: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR,
            port: DEFAULT_PORT,
            client_channel_capacity: DEFAULT_CLIENT_CHANNEL_CAPACITY,
            default_room: DEFAULT_ROOM.to_owned(),
        }
    }
}

impl ServerConfig {
    /// Build typed server config from environment variables.
    ///
    /// Optional:
    /// - `PORT`: default 3000
    /// - `BIND_ADDR`: default `0.0.0.0`
    /// - `CLIENT_CHANNEL_CAPACITY`: default 256
    /// - `DEFAULT_ROOM`: default `default`
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for values that cannot be defaulted away.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading through an arbitrary lookup.
    ///
    /// # Errors
    ///
    /// See `from_env`.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = match var("BIND_ADDR") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidBindAddr(raw))?,
            None => DEFAULT_BIND_ADDR,
        };
        let port = parse_or(var("PORT"), DEFAULT_PORT);
        let client_channel_capacity = parse_or(var("CLIENT_CHANNEL_CAPACITY"), DEFAULT_CLIENT_CHANNEL_CAPACITY);
        if client_channel_capacity == 0 {
            return Err(ConfigError::ZeroChannelCapacity);
        }
        let default_room = var("DEFAULT_ROOM").map_or_else(|| DEFAULT_ROOM.to_owned(), |r| r.trim().to_owned());
        if default_room.is_empty() {
            return Err(ConfigError::EmptyDefaultRoom);
        }

        Ok(Self { bind_addr, port, client_channel_capacity, default_room })
    }

    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse::<T>().ok()).unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
