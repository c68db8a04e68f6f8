//! # Proxy Server
//!
//! Accepts client connections and turns them into [`ProxiedPlayer`]s.
//!
//! # Lifecycle
//!
//! ```text
//! 1. Accept TCP connection, spawn its session tasks
//! 2. Wait for the client's Login packet
//! 3. Check player limit and duplicate names
//! 4. Register player, emit PlayerLogin
//! 5. Try each initial server in order until one accepts
//! 6. Repeat until shutdown
//! ```
//!
//! Everything a player needs from the proxy (config, transport, registry,
//! events, player manager) lives in one shared [`ProxyContext`].

use bytes::Bytes;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use tideway_core::{IdGenerator, ProtocolVersion, ProxyError, Result};
use tideway_protocol::Packet;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use crate::config::NetworkConfig;
use crate::events::{EventManager, ProxyEvent};
use crate::manager::PlayerManager;
use crate::player::ProxiedPlayer;
use crate::server_info::{ServerInfo, ServerInfoMap};
use crate::transfer::{TransferCallback, TransferPhase};
use crate::transport::tcp::{bind_listener, TcpSession, TcpSessionConfig, TcpTransport};
use crate::transport::{BatchHandler, Session, TransportFactory};

/// Shared state of one proxy instance
pub struct ProxyContext {
    pub config: NetworkConfig,
    pub transport: Arc<dyn TransportFactory>,
    pub servers: Arc<ServerInfoMap>,
    pub events: EventManager,
    pub players: PlayerManager,
    ids: IdGenerator,
}

impl ProxyContext {
    pub fn new(config: NetworkConfig, transport: Arc<dyn TransportFactory>, servers: Arc<ServerInfoMap>) -> Arc<Self> {
        Arc::new(Self {
            config,
            transport,
            servers,
            events: EventManager::new(),
            players: PlayerManager::new(),
            ids: IdGenerator::new(),
        })
    }

    /// Register a client that sent its Login packet
    ///
    /// # Errors
    /// - [`ProxyError::InvalidData`] if `login` is not a Login packet
    /// - [`ProxyError::InvalidState`] when the proxy is full or the name is taken
    ///
    /// The client is disconnected with a message on rejection.
    pub fn login(self: &Arc<Self>, upstream: Arc<dyn Session>, login: Packet) -> Result<Arc<ProxiedPlayer>> {
        let Packet::Login {
            protocol_version,
            username,
            client_uuid,
            ..
        } = &login
        else {
            return Err(ProxyError::InvalidData(format!("expected Login, got packet {:#x}", login.id())));
        };
        let (protocol, name, uuid) = (ProtocolVersion::new(*protocol_version), username.clone(), *client_uuid);

        if self.players.player_count() >= self.config.max_players {
            tracing::warn!("[{}|{}] Login rejected: proxy full", upstream.address(), name);
            upstream.disconnect(Some("The proxy is full"));
            return Err(ProxyError::InvalidState("proxy full".into()));
        }

        let player = ProxiedPlayer::new(
            self.ids.next_player_id(),
            name.clone(),
            uuid,
            protocol,
            upstream.clone(),
            login,
            self.clone(),
        );
        if !self.players.add_player(player.clone()) {
            tracing::warn!("[{}|{}] Login rejected: name in use", upstream.address(), name);
            upstream.disconnect(Some("A player with this name is already connected"));
            return Err(ProxyError::InvalidState(format!("{} is already connected", name)));
        }

        tracing::info!("[{}|{}] Logged in as {} ({})", upstream.address(), name, player.id(), uuid);
        self.events.emit(ProxyEvent::PlayerLogin {
            player: player.id(),
            name,
            address: upstream.address(),
        });
        Ok(player)
    }

    /// Connect a fresh player to the first initial server that accepts it
    ///
    /// # Errors
    /// [`ProxyError::NotFound`] when every initial server failed; the player
    /// is disconnected.
    pub async fn connect_initial(&self, player: &Arc<ProxiedPlayer>) -> Result<Arc<ServerInfo>> {
        for name in &self.config.initial_servers {
            let Some(info) = self.servers.get(name) else {
                tracing::warn!("Initial server {} is not registered", name);
                continue;
            };
            let callback = player.connect(info.clone())?;
            if callback.finished().await == TransferPhase::Done {
                return Ok(info);
            }
            if player.is_disconnected() {
                return Err(ProxyError::SessionAlreadyClosed);
            }
        }

        player.disconnect(Some("No server available"));
        Err(ProxyError::NotFound(format!("no initial server accepted {}", player.name())))
    }

    /// Move a player to another server by name
    ///
    /// # Errors
    /// [`ProxyError::NotFound`] for an unknown player or server, otherwise
    /// whatever [`ProxiedPlayer::connect`] rejects the request with
    pub fn transfer(&self, player: &str, server: &str) -> Result<Arc<TransferCallback>> {
        let target = self.servers.lookup(server)?;
        let player = self
            .players
            .get_by_name(player)
            .ok_or_else(|| ProxyError::NotFound(format!("player {}", player)))?;
        player.connect(target)
    }
}

/// Waits on a new client session for its Login packet
struct LoginHandler {
    context: Arc<ProxyContext>,
    session: Weak<dyn Session>,
    player: Mutex<Option<Weak<ProxiedPlayer>>>,
}

impl LoginHandler {
    fn find_login(batch: Vec<Bytes>) -> Option<Packet> {
        batch
            .into_iter()
            .filter_map(|frame| Packet::decode(frame).ok())
            .find(|packet| matches!(packet, Packet::Login { .. }))
    }
}

impl BatchHandler for LoginHandler {
    fn handle(&self, source: &dyn Session, batch: Vec<Bytes>) {
        if self.player.lock().is_some() {
            tracing::trace!("[{}] Dropping batch until the initial server is up", source.address());
            return;
        }
        let Some(login) = Self::find_login(batch) else {
            tracing::debug!("[{}] Dropping batch before login", source.address());
            return;
        };
        let Some(session) = self.session.upgrade() else {
            return;
        };

        let player = match self.context.login(session, login) {
            Ok(player) => player,
            Err(e) => {
                tracing::debug!("[{}] Login failed: {}", source.address(), e);
                return;
            }
        };
        *self.player.lock() = Some(Arc::downgrade(&player));

        let context = self.context.clone();
        tokio::spawn(async move {
            if let Err(e) = context.connect_initial(&player).await {
                tracing::warn!("[{}] Initial connect failed: {}", player.name(), e);
            }
        });
    }

    fn on_disconnect(&self, source: &dyn Session, reason: &str) {
        let player = self.player.lock().as_ref().and_then(Weak::upgrade);
        match player {
            Some(player) => player.disconnect(Some(reason)),
            None => tracing::debug!("[{}] Closed before login: {}", source.address(), reason),
        }
    }
}

/// Main proxy instance
///
/// # Shutdown
///
/// [`ProxyServer::run`] returns once [`ProxyServer::shutdown`] is called or
/// Ctrl-C is received. Every player is disconnected on the way out.
pub struct ProxyServer {
    context: Arc<ProxyContext>,
    listener: TcpListener,
    session_config: TcpSessionConfig,
    shutdown: Arc<Notify>,
}

impl ProxyServer {
    /// Validate the config, bind the client listener and the TCP backend transport
    ///
    /// # Errors
    /// - [`ProxyError::Config`] if the configuration is invalid
    /// - [`ProxyError::Io`] if the listener cannot be bound
    pub async fn bind(config: NetworkConfig, servers: ServerInfoMap) -> Result<Self> {
        let transport = Arc::new(TcpTransport::new(config.session_config()));
        Self::bind_with_transport(config, servers, transport).await
    }

    /// Like [`ProxyServer::bind`], with a custom backend transport
    ///
    /// # Errors
    /// See [`ProxyServer::bind`].
    pub async fn bind_with_transport(
        config: NetworkConfig,
        servers: ServerInfoMap,
        transport: Arc<dyn TransportFactory>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ProxyError::Config(format!("Invalid configuration: {}", e)))?;

        let listener = bind_listener(config.bind_address)?;
        let session_config = config.session_config();

        tracing::info!("Tideway listening on {}", listener.local_addr()?);
        tracing::info!(
            "Configuration: max_players={}, compression={:?}, servers={}",
            config.max_players,
            config.compression,
            servers.len()
        );

        Ok(Self {
            context: ProxyContext::new(config, transport, Arc::new(servers)),
            listener,
            session_config,
            shutdown: Arc::new(Notify::new()),
        })
    }

    pub fn context(&self) -> &Arc<ProxyContext> {
        &self.context
    }

    /// # Errors
    /// [`ProxyError::Io`] if the socket has no local address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Stop [`ProxyServer::run`]
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Handle usable from other tasks to stop the server
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    pub fn transfer(&self, player: &str, server: &str) -> Result<Arc<TransferCallback>> {
        self.context.transfer(player, server)
    }

    /// Accept clients until shutdown
    ///
    /// # Errors
    /// Accept errors are logged, not returned; this only fails if the
    /// runtime does.
    pub async fn run(&self) -> Result<()> {
        tracing::info!("Tideway starting main loop");

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            tracing::debug!("New connection from {}", addr);
                            if let Err(e) = self.accept(stream) {
                                tracing::error!("Error setting up session for {}: {}", addr, e);
                            }
                        }
                        Err(e) => {
                            tracing::error!("Error accepting connection: {:?}", e);
                        }
                    }
                }

                _ = self.shutdown.notified() => {
                    tracing::info!("Shutdown requested");
                    break;
                }

                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl-C received, initiating shutdown");
                    break;
                }
            }
        }

        let players = self.context.players.players();
        tracing::info!("Disconnecting {} players", players.len());
        for player in players {
            player.disconnect(Some("Proxy shutting down"));
        }
        Ok(())
    }

    fn accept(&self, stream: tokio::net::TcpStream) -> Result<()> {
        let session = TcpSession::spawn(stream, Default::default(), self.session_config)?;
        let session: Arc<dyn Session> = session;
        let handler = LoginHandler {
            context: self.context.clone(),
            session: Arc::downgrade(&session),
            player: Mutex::new(None),
        };
        session.set_batch_handler(Arc::new(handler));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{login_packet, Harness};
    use crate::transport::memory::MemorySession;

    #[tokio::test]
    async fn test_login_registers_player() {
        let harness = Harness::new();
        let mut events = harness.context.events.channel();

        let upstream = MemorySession::new(SocketAddr::from(([10, 0, 0, 1], 50000)));
        let player = harness.context.login(upstream, login_packet("Steve")).unwrap();

        assert_eq!(player.name(), "Steve");
        assert!(harness.context.players.get_by_name("steve").is_some());
        assert!(matches!(events.try_recv(), Ok(ProxyEvent::PlayerLogin { ref name, .. }) if name == "Steve"));
    }

    #[tokio::test]
    async fn test_duplicate_name_is_rejected() {
        let harness = Harness::new();
        let first = MemorySession::new(SocketAddr::from(([10, 0, 0, 1], 50000)));
        let second = MemorySession::new(SocketAddr::from(([10, 0, 0, 2], 50000)));

        harness.context.login(first.clone(), login_packet("Steve")).unwrap();
        assert!(harness.context.login(second.clone(), login_packet("STEVE")).is_err());

        assert!(second.is_closed());
        assert!(!first.is_closed());
        assert_eq!(harness.context.players.player_count(), 1);
    }

    #[tokio::test]
    async fn test_non_login_packet_is_rejected() {
        let harness = Harness::new();
        let upstream = MemorySession::new(SocketAddr::from(([10, 0, 0, 1], 50000)));
        let err = harness
            .context
            .login(upstream, Packet::PlayStatus { status: 0 })
            .err()
            .unwrap();
        assert!(matches!(err, ProxyError::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_initial_server_fallback() {
        let harness = Harness::with_initial(&["offline", "missing", "lobby"]);
        let upstream = MemorySession::new(SocketAddr::from(([10, 0, 0, 1], 50000)));
        let player = harness.context.login(upstream, login_packet("Steve")).unwrap();

        let joined = harness.context.connect_initial(&player).await.unwrap();
        assert_eq!(joined.name(), "lobby");
        assert_eq!(player.server().unwrap().info().name(), "lobby");
        assert!(player.pending_transfer().is_none());
    }

    #[tokio::test]
    async fn test_no_initial_server_disconnects() {
        let harness = Harness::with_initial(&["offline"]);
        let upstream = MemorySession::new(SocketAddr::from(([10, 0, 0, 1], 50000)));
        let player = harness.context.login(upstream.clone(), login_packet("Steve")).unwrap();

        let err = harness.context.connect_initial(&player).await.err().unwrap();
        assert!(matches!(err, ProxyError::NotFound(_)));
        assert!(upstream.is_closed());
        assert!(harness.context.players.get_player(player.id()).is_none());
    }

    #[tokio::test]
    async fn test_transfer_by_name() {
        let harness = Harness::new();
        harness.joined_player("lobby").await;

        assert!(matches!(
            harness.context.transfer("nobody", "survival"),
            Err(ProxyError::NotFound(_))
        ));
        assert!(matches!(
            harness.context.transfer("Alex", "nowhere"),
            Err(ProxyError::NotFound(_))
        ));
        let callback = harness.context.transfer("alex", "SURVIVAL").unwrap();
        assert_eq!(callback.target().name(), "survival");
    }
}
