//! Tideway Configuration Management
//!
//! Loads the proxy settings (`config/proxy.txt`) and the backend list
//! (`config/servers.txt`). Both are plain `key = value` files with `#`
//! comments; unknown keys and malformed lines are skipped with a warning.

use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use tideway_core::{ProtocolVersion, ProxyError, Result};

/// Type tag used when a server line does not name one
pub const DEFAULT_SERVER_TYPE: &str = "bedrock";

/// One backend from `servers.txt`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEntry {
    /// Name used by players and console commands
    pub name: String,
    /// Address the proxy connects to
    pub address: SocketAddr,
    /// Address advertised to clients (defaults to `address`)
    pub public_address: SocketAddr,
    /// Connector type tag
    pub server_type: String,
}

/// Complete proxy configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    // ========== From proxy.txt ==========
    /// Listener address for clients (from "bind")
    pub bind: SocketAddr,
    /// Player cap (from "maxplayers")
    pub max_players: usize,
    /// Backend connect timeout in milliseconds (from "connecttimeout")
    pub connect_timeout_ms: u64,
    /// Pending batch flush interval in milliseconds (from "flushinterval")
    pub flush_interval_ms: u64,
    /// Batch compression name (from "compression")
    pub compression: String,
    /// Default tracing filter (from "loglevel")
    pub log_level: String,
    /// Protocol version spoken to backends (from "protocol")
    pub protocol: ProtocolVersion,
    /// Server names tried in order on join (from "try")
    pub try_servers: Vec<String>,

    // ========== From servers.txt ==========
    pub servers: Vec<ServerEntry>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 19132)),
            max_players: 500,
            connect_timeout_ms: 15_000,
            flush_interval_ms: 50,
            compression: "zlib".into(),
            log_level: "info".into(),
            protocol: ProtocolVersion::DEFAULT,
            try_servers: vec!["lobby".into()],
            servers: Vec::new(),
        }
    }
}

/// Split `key = value`, skipping blanks and comments
fn key_values(content: &str) -> impl Iterator<Item = (usize, &str, &str)> {
    content.lines().enumerate().filter_map(|(idx, line)| {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        match line.split_once('=') {
            Some((key, value)) => Some((idx + 1, key.trim(), value.trim())),
            None => {
                tracing::warn!("Ignoring line {} without '=': {}", idx + 1, line);
                None
            }
        }
    })
}

fn resolve_address(value: &str) -> Result<SocketAddr> {
    if let Ok(addr) = value.parse() {
        return Ok(addr);
    }
    value
        .to_socket_addrs()
        .map_err(|e| ProxyError::Config(format!("Cannot resolve '{}': {}", value, e)))?
        .next()
        .ok_or_else(|| ProxyError::Config(format!("No address for '{}'", value)))
}

impl ProxyConfig {
    /// Load settings from a `proxy.txt` file (server list left empty)
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Load `proxy.txt` and `servers.txt` from a config directory
    ///
    /// A missing `proxy.txt` falls back to defaults; a missing `servers.txt`
    /// is an error since the proxy cannot route anyone without backends.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();

        let mut config = match fs::read_to_string(dir.join("proxy.txt")) {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("{} not found, using defaults", dir.join("proxy.txt").display());
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };

        let servers = fs::read_to_string(dir.join("servers.txt")).map_err(|e| {
            ProxyError::Config(format!("Cannot read {}: {}", dir.join("servers.txt").display(), e))
        })?;
        config.servers = Self::parse_servers(&servers);

        Ok(config)
    }

    /// Load configuration from the default `config/` directory
    pub fn load_default() -> Result<Self> {
        Self::load_dir("config")
    }

    /// Parse proxy.txt content
    fn parse(content: &str) -> Self {
        let mut config = Self::default();
        for (_, key, value) in key_values(content) {
            config.parse_option(key, value);
        }
        config
    }

    fn parse_option(&mut self, key: &str, value: &str) {
        match key.to_ascii_lowercase().as_str() {
            "bind" => match value.parse() {
                Ok(addr) => self.bind = addr,
                Err(_) => tracing::warn!("Invalid bind address: {}", value),
            },
            "maxplayers" => {
                self.max_players = value.parse().unwrap_or(500);
            }
            "connecttimeout" => {
                self.connect_timeout_ms = value.parse().unwrap_or(15_000);
            }
            "flushinterval" => {
                self.flush_interval_ms = value.parse().unwrap_or(50);
            }
            "compression" => self.compression = value.to_ascii_lowercase(),
            "loglevel" => self.log_level = value.into(),
            "protocol" => {
                self.protocol = value.parse().map(ProtocolVersion::new).unwrap_or_default();
            }
            "try" => {
                self.try_servers = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
            }
            _ => {
                tracing::debug!("Unknown config option: {} = {}", key, value);
            }
        }
    }

    /// Parse servers.txt: `name = address[, public_address[, type]]`
    fn parse_servers(content: &str) -> Vec<ServerEntry> {
        let mut servers: Vec<ServerEntry> = Vec::new();

        for (line_no, name, value) in key_values(content) {
            if name.is_empty() {
                tracing::warn!("servers.txt:{}: missing server name", line_no);
                continue;
            }
            if servers.iter().any(|s| s.name.eq_ignore_ascii_case(name)) {
                tracing::warn!("servers.txt:{}: duplicate server '{}'", line_no, name);
                continue;
            }

            let mut parts = value.split(',').map(str::trim);
            let address = match parts.next().map(resolve_address) {
                Some(Ok(addr)) => addr,
                Some(Err(e)) => {
                    tracing::warn!("servers.txt:{}: {}", line_no, e);
                    continue;
                }
                None => continue,
            };
            let public_address = match parts.next().filter(|s| !s.is_empty()) {
                Some(public) => match resolve_address(public) {
                    Ok(addr) => addr,
                    Err(e) => {
                        tracing::warn!("servers.txt:{}: {}", line_no, e);
                        continue;
                    }
                },
                None => address,
            };
            let server_type = parts
                .next()
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_SERVER_TYPE)
                .to_ascii_lowercase();

            servers.push(ServerEntry {
                name: name.to_string(),
                address,
                public_address,
                server_type,
            });
        }

        servers
    }

    /// Display configuration summary
    pub fn display(&self) {
        tracing::info!("Proxy configuration:");
        tracing::info!("  Bind: {}", self.bind);
        tracing::info!("  Max Players: {}", self.max_players);
        tracing::info!("  Protocol: {}", self.protocol.get());
        tracing::info!("  Connect Timeout: {}ms", self.connect_timeout_ms);
        tracing::info!("  Flush Interval: {}ms", self.flush_interval_ms);
        tracing::info!("  Compression: {}", self.compression);
        tracing::info!("  Try: {}", self.try_servers.join(", "));
        tracing::info!("  Servers: {}", self.servers.len());
        for server in &self.servers {
            tracing::info!("    {} -> {} [{}]", server.name, server.address, server.server_type);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ProxyConfig::default();
        assert_eq!(config.bind.port(), 19132);
        assert_eq!(config.max_players, 500);
        assert_eq!(config.try_servers, vec!["lobby".to_string()]);
    }

    #[test]
    fn test_parse_simple_config() {
        let config_text = r#"
# proxy settings
bind = 127.0.0.1:25000
maxplayers = 50
connecttimeout = 2500
try = hub, fallback ,
protocol = not-a-number
"#;
        let config = ProxyConfig::parse(config_text);
        assert_eq!(config.bind, "127.0.0.1:25000".parse().unwrap());
        assert_eq!(config.max_players, 50);
        assert_eq!(config.connect_timeout_ms, 2500);
        assert_eq!(config.try_servers, vec!["hub".to_string(), "fallback".to_string()]);
        assert_eq!(config.protocol, ProtocolVersion::DEFAULT);
    }

    #[test]
    fn test_parse_servers_defaults_and_skips() {
        let servers = ProxyConfig::parse_servers(
            "lobby = 127.0.0.1:19133\n\
             Survival = 127.0.0.1:19134, 10.0.0.5:19134, BEDROCK\n\
             broken = not an address\n\
             LOBBY = 127.0.0.1:19135\n",
        );
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].public_address, servers[0].address);
        assert_eq!(servers[0].server_type, DEFAULT_SERVER_TYPE);
        assert_eq!(servers[1].public_address, "10.0.0.5:19134".parse().unwrap());
        assert_eq!(servers[1].server_type, "bedrock");
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut proxy = std::fs::File::create(dir.path().join("proxy.txt")).unwrap();
        writeln!(proxy, "maxplayers = 3").unwrap();
        let mut servers = std::fs::File::create(dir.path().join("servers.txt")).unwrap();
        writeln!(servers, "lobby = 127.0.0.1:19133").unwrap();

        let config = ProxyConfig::load_dir(dir.path()).unwrap();
        assert_eq!(config.max_players, 3);
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0].name, "lobby");
    }

    #[test]
    fn test_load_dir_without_servers_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(ProxyConfig::load_dir(dir.path()), Err(ProxyError::Config(_))));
    }
}
