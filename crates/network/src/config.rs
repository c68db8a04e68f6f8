//! # Network Configuration
//!
//! Runtime view of the proxy settings, built from the file-level
//! [`ProxyConfig`] and validated before the listener is bound.
//!
//! # Example
//!
//! ```rust
//! use tideway_network::NetworkConfig;
//! use std::time::Duration;
//!
//! let config = NetworkConfig {
//!     bind_address: "0.0.0.0:19132".parse().unwrap(),
//!     connect_timeout: Duration::from_secs(5),
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::net::SocketAddr;
use std::time::Duration;
use tideway_config::ProxyConfig;
use tideway_core::ProtocolVersion;
use tideway_protocol::CompressionType;

use crate::transport::tcp::TcpSessionConfig;

/// Network configuration options
///
/// # Default Values
///
/// - Port 19132 (standard Bedrock port)
/// - 500 players
/// - 15-second backend connect timeout
/// - 50ms flush interval for queued packets
/// - zlib batch compression
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Address the client listener binds to
    pub bind_address: SocketAddr,

    /// Maximum number of players connected at once
    ///
    /// Logins beyond this are refused with a disconnect message.
    pub max_players: usize,

    /// How long a backend connect may take before `ConnectTimeout`
    pub connect_timeout: Duration,

    /// How often queued packets are written out as one batch
    ///
    /// # Notes
    /// - Immediate sends bypass this
    /// - Lower values trade bandwidth for latency
    pub flush_interval: Duration,

    /// Compression applied to every batch, both directions
    pub compression: CompressionType,

    /// Protocol version spoken to backends
    pub protocol: ProtocolVersion,

    /// Servers tried, in order, when a player joins
    pub initial_servers: Vec<String>,

    /// Largest batch frame accepted on the wire
    pub max_frame_length: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 19132)),
            max_players: 500,
            connect_timeout: Duration::from_secs(15),
            flush_interval: Duration::from_millis(50),
            compression: CompressionType::Zlib,
            protocol: ProtocolVersion::DEFAULT,
            initial_servers: vec!["lobby".to_string()],
            max_frame_length: 8 * 1024 * 1024,
        }
    }
}

impl From<&ProxyConfig> for NetworkConfig {
    fn from(config: &ProxyConfig) -> Self {
        let compression = CompressionType::from_name(&config.compression).unwrap_or_else(|| {
            tracing::warn!("Unknown compression '{}', using zlib", config.compression);
            CompressionType::Zlib
        });

        Self {
            bind_address: config.bind,
            max_players: config.max_players,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            flush_interval: Duration::from_millis(config.flush_interval_ms),
            compression,
            protocol: config.protocol,
            initial_servers: config.try_servers.clone(),
            ..Default::default()
        }
    }
}

impl NetworkConfig {
    /// Validate the configuration
    ///
    /// # Returns
    /// `Ok(())` if configuration is valid, `Err(String)` otherwise
    ///
    /// # Checks
    /// - `max_players` must be > 0
    /// - `connect_timeout` and `flush_interval` must be non-zero
    /// - `flush_interval` must be shorter than `connect_timeout`
    /// - at least one initial server must be configured
    pub fn validate(&self) -> Result<(), String> {
        if self.max_players == 0 {
            return Err("max_players must be > 0".to_string());
        }

        if self.connect_timeout.is_zero() {
            return Err("connect_timeout must be > 0".to_string());
        }

        if self.flush_interval.is_zero() {
            return Err("flush_interval must be > 0".to_string());
        }

        if self.flush_interval >= self.connect_timeout {
            return Err("flush_interval must be < connect_timeout".to_string());
        }

        if self.initial_servers.is_empty() {
            return Err("at least one initial server is required".to_string());
        }

        if self.flush_interval > Duration::from_millis(500) {
            tracing::warn!("flush_interval above 500ms will make the game feel sluggish");
        }

        Ok(())
    }

    /// Transport settings for every session opened by the proxy
    pub fn session_config(&self) -> TcpSessionConfig {
        TcpSessionConfig {
            flush_interval: self.flush_interval,
            compression: self.compression,
            max_frame_length: self.max_frame_length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NetworkConfig::default();
        assert_eq!(config.bind_address.port(), 19132);
        assert_eq!(config.max_players, 500);
        assert_eq!(config.compression, CompressionType::Zlib);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_proxy_config() {
        let proxy = ProxyConfig {
            connect_timeout_ms: 2_000,
            compression: "none".into(),
            try_servers: vec!["hub".into()],
            ..Default::default()
        };
        let config = NetworkConfig::from(&proxy);
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.compression, CompressionType::None);
        assert_eq!(config.initial_servers, vec!["hub".to_string()]);
    }

    #[test]
    fn test_invalid_max_players() {
        let config = NetworkConfig {
            max_players: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_flush_interval_must_be_shorter_than_timeout() {
        let config = NetworkConfig {
            connect_timeout: Duration::from_millis(50),
            flush_interval: Duration::from_millis(50),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
