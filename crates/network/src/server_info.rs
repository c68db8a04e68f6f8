//! Backend server registry
//!
//! A [`ServerInfo`] describes one backend and remembers which players are on
//! it. The connector used to reach a backend is picked from its type tag
//! once, when the descriptor is created.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tideway_config::{ServerEntry, DEFAULT_SERVER_TYPE};
use tideway_core::{PlayerId, ProxyError, Result};

use crate::downstream::bedrock::BedrockDownstream;
use crate::downstream::DownstreamConnection;
use crate::transport::TransportFactory;

/// Creates an unbound connection to a backend
pub type ConnectorFactory = fn(Arc<ServerInfo>, Arc<dyn TransportFactory>) -> Arc<dyn DownstreamConnection>;

pub struct ServerInfo {
    name: String,
    address: SocketAddr,
    public_address: SocketAddr,
    server_type: String,
    connector: ConnectorFactory,
    players: RwLock<HashSet<PlayerId>>,
}

impl fmt::Debug for ServerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerInfo")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("public_address", &self.public_address)
            .field("server_type", &self.server_type)
            .finish()
    }
}

impl ServerInfo {
    pub fn new(
        name: impl Into<String>,
        address: SocketAddr,
        public_address: SocketAddr,
        server_type: impl Into<String>,
        connector: ConnectorFactory,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            address,
            public_address,
            server_type: server_type.into(),
            connector,
            players: RwLock::new(HashSet::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn public_address(&self) -> SocketAddr {
        self.public_address
    }

    pub fn server_type(&self) -> &str {
        &self.server_type
    }

    /// New, unbound connection to this backend
    pub fn bind_new_connection(self: &Arc<Self>, transport: Arc<dyn TransportFactory>) -> Arc<dyn DownstreamConnection> {
        (self.connector)(self.clone(), transport)
    }

    pub fn add_player(&self, player: PlayerId) {
        self.players.write().insert(player);
    }

    pub fn remove_player(&self, player: PlayerId) {
        self.players.write().remove(&player);
    }

    pub fn has_player(&self, player: PlayerId) -> bool {
        self.players.read().contains(&player)
    }

    pub fn player_count(&self) -> usize {
        self.players.read().len()
    }

    pub fn players(&self) -> Vec<PlayerId> {
        self.players.read().iter().copied().collect()
    }
}

/// Case-insensitive name -> server map plus the type tag registry
pub struct ServerInfoMap {
    servers: DashMap<String, Arc<ServerInfo>>,
    connectors: DashMap<String, ConnectorFactory>,
}

impl Default for ServerInfoMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerInfoMap {
    /// Empty map with the `bedrock` connector registered
    pub fn new() -> Self {
        let connectors: DashMap<String, ConnectorFactory> = DashMap::new();
        connectors.insert(DEFAULT_SERVER_TYPE.to_string(), BedrockDownstream::connector);
        Self {
            servers: DashMap::new(),
            connectors,
        }
    }

    /// Build the map from `servers.txt` entries
    pub fn from_entries(entries: &[ServerEntry]) -> Self {
        let map = Self::new();
        for entry in entries {
            map.put(map.create(entry));
        }
        map
    }

    /// Register a connector for a type tag
    pub fn register_connector(&self, server_type: &str, connector: ConnectorFactory) {
        self.connectors.insert(server_type.to_ascii_lowercase(), connector);
    }

    /// Descriptor for a config entry
    ///
    /// Unknown type tags fall back to the default connector.
    pub fn create(&self, entry: &ServerEntry) -> Arc<ServerInfo> {
        let connector = match self.connectors.get(&entry.server_type.to_ascii_lowercase()) {
            Some(connector) => *connector,
            None => {
                tracing::warn!(
                    "Unknown server type '{}' for {}, using {}",
                    entry.server_type,
                    entry.name,
                    DEFAULT_SERVER_TYPE
                );
                BedrockDownstream::connector
            }
        };
        ServerInfo::new(
            entry.name.clone(),
            entry.address,
            entry.public_address,
            entry.server_type.clone(),
            connector,
        )
    }

    pub fn get(&self, name: &str) -> Option<Arc<ServerInfo>> {
        self.servers.get(&name.to_ascii_lowercase()).map(|entry| entry.clone())
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<ServerInfo>> {
        self.get(name)
            .ok_or_else(|| ProxyError::NotFound(format!("server '{}'", name)))
    }

    /// Insert or replace a server, returning the replaced one
    pub fn put(&self, info: Arc<ServerInfo>) -> Option<Arc<ServerInfo>> {
        self.servers.insert(info.name().to_ascii_lowercase(), info)
    }

    pub fn remove(&self, name: &str) -> Option<Arc<ServerInfo>> {
        self.servers.remove(&name.to_ascii_lowercase()).map(|(_, info)| info)
    }

    pub fn values(&self) -> Vec<Arc<ServerInfo>> {
        let mut servers: Vec<_> = self.servers.iter().map(|entry| entry.value().clone()).collect();
        servers.sort_by(|a, b| a.name().cmp(b.name()));
        servers
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}
