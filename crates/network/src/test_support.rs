//! Shared fixtures for the proxy tests: a context over the in-memory
//! transport with four backends.
//!
//! | name | behaviour |
//! |---|---|
//! | lobby | accepts |
//! | survival | accepts |
//! | slow | never answers |
//! | offline | refuses |

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tideway_config::{ServerEntry, DEFAULT_SERVER_TYPE};
use tideway_core::{Vector3f, Vector3i};
use tideway_protocol::{dimension, play_status, GameRule, GameRuleValue, ItemEntry, Packet, StartGame};
use uuid::Uuid;

use crate::config::NetworkConfig;
use crate::player::ProxiedPlayer;
use crate::server::ProxyContext;
use crate::server_info::{ServerInfo, ServerInfoMap};
use crate::transfer::TransferPhase;
use crate::transport::memory::{MemorySession, MemoryTransport};
use crate::transport::Session;

pub(crate) fn login_packet(name: &str) -> Packet {
    Packet::Login {
        protocol_version: 486,
        username: name.to_string(),
        client_uuid: Uuid::new_v4(),
        extra: bytes::Bytes::new(),
    }
}

pub(crate) fn start_game(runtime_entity_id: i64, dimension: i32) -> StartGame {
    StartGame {
        unique_entity_id: runtime_entity_id,
        runtime_entity_id,
        game_mode: 0,
        player_position: Vector3f::new(0.5, 64.0, 0.5),
        pitch: 0.0,
        yaw: 180.0,
        dimension,
        default_spawn: Vector3i::ZERO,
        difficulty: 1,
        game_rules: vec![GameRule::new("showcoordinates", GameRuleValue::Bool(true))],
        item_palette: vec![ItemEntry::new("minecraft:shield", 355)],
        extra: bytes::Bytes::new(),
    }
}

fn entry(name: &str, port: u16) -> ServerEntry {
    let address = SocketAddr::from(([127, 0, 0, 1], port));
    ServerEntry {
        name: name.to_string(),
        address,
        public_address: address,
        server_type: DEFAULT_SERVER_TYPE.to_string(),
    }
}

pub(crate) struct Harness {
    pub transport: MemoryTransport,
    pub context: Arc<ProxyContext>,
    /// Client side of the player made by [`Harness::joined_player`]
    pub upstream: Arc<MemorySession>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_initial(&["lobby"])
    }

    pub fn with_initial(initial: &[&str]) -> Self {
        let transport = MemoryTransport::new();
        let entries = [
            entry("lobby", 19133),
            entry("survival", 19134),
            entry("slow", 19135),
            entry("offline", 19136),
        ];
        transport.register_backend(entries[0].address);
        transport.register_backend(entries[1].address);
        transport.register_unresponsive(entries[2].address);

        let config = NetworkConfig {
            connect_timeout: Duration::from_millis(50),
            flush_interval: Duration::from_millis(10),
            initial_servers: initial.iter().map(|name| name.to_string()).collect(),
            ..Default::default()
        };
        let servers = Arc::new(ServerInfoMap::from_entries(&entries));
        let context = ProxyContext::new(config, Arc::new(transport.clone()), servers);

        Self {
            transport,
            context,
            upstream: MemorySession::new(SocketAddr::from(([10, 0, 0, 7], 51000))),
        }
    }

    pub fn server(&self, name: &str) -> Arc<ServerInfo> {
        self.context.servers.get(name).expect("server registered")
    }

    /// Latest session opened to the named backend
    pub fn backend(&self, name: &str) -> Arc<MemorySession> {
        self.transport
            .last_session_to(self.server(name).address())
            .expect("backend session")
    }

    /// Wait until an open session to `name` has received the login replay
    pub async fn wait_for_backend(&self, name: &str) -> Arc<MemorySession> {
        let address = self.server(name).address();
        let wait = async {
            loop {
                if let Some(session) = self.transport.last_session_to(address) {
                    if !session.is_closed() && !session.sent().is_empty() {
                        return session;
                    }
                }
                tokio::task::yield_now().await;
            }
        };
        tokio::time::timeout(Duration::from_secs(1), wait)
            .await
            .expect("backend connected")
    }

    /// Player "Alex" logged in and spawned on `server`
    pub async fn joined_player(&self, server: &str) -> Arc<ProxiedPlayer> {
        let player = self
            .context
            .login(self.upstream.clone(), login_packet("Alex"))
            .expect("login accepted");
        let callback = player.connect(self.server(server)).expect("connect accepted");
        assert_eq!(callback.finished().await, TransferPhase::Done);

        self.backend(server).inject_batch(&[
            Packet::StartGame(Box::new(start_game(1, dimension::OVERWORLD))),
            Packet::PlayStatus {
                status: play_status::PLAYER_SPAWN,
            },
        ]);
        player
    }
}
