//! # Proxied Player
//!
//! One client connection and everything the proxy knows about it.
//!
//! # Link state
//!
//! The active [`ServerConnection`] and its [`RewriteData`] live together in
//! one [`LinkState`] behind a single lock. Bridges take a snapshot of both at
//! once, so a batch is never translated with one backend's map and forwarded
//! to another backend. Only the transfer machinery replaces the link.

use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tideway_core::{PlayerId, ProtocolVersion, ProxyError, Result};
use tideway_protocol::{boss_event_action, player_list_action, Packet};
use uuid::Uuid;

use crate::bridge::{BridgeRole, PacketHandler, TransferBatchBridge};
use crate::connection::ServerConnection;
use crate::events::ProxyEvent;
use crate::rewrite::RewriteData;
use crate::server::ProxyContext;
use crate::server_info::ServerInfo;
use crate::transfer::{TransferCallback, TransferPhase};
use crate::transport::Session;

/// Active backend plus the map used to talk to it
#[derive(Clone, Default)]
pub struct LinkState {
    pub server: Option<Arc<ServerConnection>>,
    pub rewrite: Arc<RewriteData>,
}

/// What the current backend created on the client
///
/// Removed from the client when it leaves for another backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackedState {
    pub entities: HashSet<i64>,
    pub bossbars: HashSet<i64>,
    pub objectives: HashSet<String>,
    pub players: HashSet<Uuid>,
}

impl TrackedState {
    pub fn track(&mut self, packet: &Packet) {
        match packet {
            Packet::AddEntity { unique_entity_id, .. } => {
                self.entities.insert(*unique_entity_id);
            }
            Packet::RemoveEntity { unique_entity_id } => {
                self.entities.remove(unique_entity_id);
            }
            Packet::BossEvent {
                boss_unique_entity_id,
                action,
                ..
            } => match *action {
                boss_event_action::CREATE => {
                    self.bossbars.insert(*boss_unique_entity_id);
                }
                boss_event_action::REMOVE => {
                    self.bossbars.remove(boss_unique_entity_id);
                }
                _ => {}
            },
            Packet::SetDisplayObjective { objective_id, .. } => {
                self.objectives.insert(objective_id.clone());
            }
            Packet::RemoveObjective { objective_id } => {
                self.objectives.remove(objective_id);
            }
            Packet::PlayerList { action, entries } => {
                for entry in entries {
                    if *action == player_list_action::ADD {
                        self.players.insert(entry.uuid);
                    } else if *action == player_list_action::REMOVE {
                        self.players.remove(&entry.uuid);
                    }
                }
            }
            _ => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.bossbars.is_empty() && self.objectives.is_empty() && self.players.is_empty()
    }
}

pub struct ProxiedPlayer {
    id: PlayerId,
    name: String,
    uuid: Uuid,
    protocol: ProtocolVersion,
    upstream: Arc<dyn Session>,
    /// Replayed to every backend
    login_packet: Packet,
    context: Arc<ProxyContext>,

    link: RwLock<LinkState>,
    pending: Mutex<Option<Arc<TransferCallback>>>,
    tracked: Mutex<TrackedState>,
    accept_play_status: AtomicBool,
    plugin_upstream: RwLock<Option<Arc<dyn PacketHandler>>>,
    disconnected: AtomicBool,
}

impl ProxiedPlayer {
    pub fn new(
        id: PlayerId,
        name: impl Into<String>,
        uuid: Uuid,
        protocol: ProtocolVersion,
        upstream: Arc<dyn Session>,
        login_packet: Packet,
        context: Arc<ProxyContext>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            name: name.into(),
            uuid,
            protocol,
            upstream,
            login_packet,
            context,
            link: RwLock::new(LinkState::default()),
            pending: Mutex::new(None),
            tracked: Mutex::new(TrackedState::default()),
            accept_play_status: AtomicBool::new(true),
            plugin_upstream: RwLock::new(None),
            disconnected: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }

    pub fn upstream(&self) -> &Arc<dyn Session> {
        &self.upstream
    }

    pub fn login_packet(&self) -> &Packet {
        &self.login_packet
    }

    pub fn context(&self) -> &Arc<ProxyContext> {
        &self.context
    }

    /// Active backend and rewrite map, read together
    pub fn link(&self) -> LinkState {
        self.link.read().clone()
    }

    pub fn server(&self) -> Option<Arc<ServerConnection>> {
        self.link.read().server.clone()
    }

    pub fn rewrite(&self) -> Arc<RewriteData> {
        self.link.read().rewrite.clone()
    }

    pub fn set_rewrite(&self, rewrite: Arc<RewriteData>) {
        self.link.write().rewrite = rewrite;
    }

    /// Modify the active rewrite map in place
    pub fn update_rewrite<F>(&self, update: F)
    where
        F: FnOnce(&mut RewriteData),
    {
        let mut link = self.link.write();
        update(Arc::make_mut(&mut link.rewrite));
    }

    /// Modify the map only while `server` is still the active backend
    ///
    /// The check and the update happen under one lock, so a backend that was
    /// just replaced can never touch its successor's map.
    pub fn update_rewrite_if_active<F>(&self, server: &Arc<ServerConnection>, update: F) -> bool
    where
        F: FnOnce(&mut RewriteData),
    {
        let mut link = self.link.write();
        if !link.server.as_ref().is_some_and(|active| Arc::ptr_eq(active, server)) {
            return false;
        }
        update(Arc::make_mut(&mut link.rewrite));
        true
    }

    /// Swap backend and map in one step, returning the previous backend
    pub(crate) fn install_link(&self, server: Arc<ServerConnection>, rewrite: Arc<RewriteData>) -> Option<Arc<ServerConnection>> {
        let mut link = self.link.write();
        let old = link.server.replace(server);
        link.rewrite = rewrite;
        old
    }

    /// First backend is up: attach without any world reset
    pub fn on_initial_server_connected(&self, server: Arc<ServerConnection>) {
        server.info().add_player(self.id);
        tracing::info!(
            "[{}|{}] -> Initial server {} connected",
            self.upstream.address(),
            self.name,
            server.info().name()
        );
        self.link.write().server = Some(server);

        if let Some(callback) = self.pending_transfer() {
            callback.on_initial_connected();
        }
    }

    pub fn pending_transfer(&self) -> Option<Arc<TransferCallback>> {
        self.pending.lock().clone()
    }

    pub(crate) fn clear_pending(&self, callback: &TransferCallback) {
        let mut pending = self.pending.lock();
        if pending
            .as_ref()
            .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), callback))
        {
            *pending = None;
        }
    }

    pub fn track(&self, packet: &Packet) {
        if matches!(
            packet,
            Packet::AddEntity { .. }
                | Packet::RemoveEntity { .. }
                | Packet::BossEvent { .. }
                | Packet::SetDisplayObjective { .. }
                | Packet::RemoveObjective { .. }
                | Packet::PlayerList { .. }
        ) {
            self.tracked.lock().track(packet);
        }
    }

    pub fn tracked(&self) -> TrackedState {
        self.tracked.lock().clone()
    }

    pub(crate) fn take_tracked(&self) -> TrackedState {
        std::mem::take(&mut *self.tracked.lock())
    }

    pub fn accepts_play_status(&self) -> bool {
        self.accept_play_status.load(Ordering::Acquire)
    }

    pub fn set_accept_play_status(&self, accept: bool) {
        self.accept_play_status.store(accept, Ordering::Release);
    }

    /// Hook run on every packet the client sends, after id rewriting
    pub fn set_plugin_upstream_handler(&self, handler: Option<Arc<dyn PacketHandler>>) {
        *self.plugin_upstream.write() = handler;
    }

    pub fn plugin_upstream_handler(&self) -> Option<Arc<dyn PacketHandler>> {
        self.plugin_upstream.read().clone()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }

    /// Start connecting to `target`
    ///
    /// Returns as soon as the attempt is registered; the connection runs on
    /// its own task and reports through the returned callback.
    ///
    /// # Errors
    /// - [`ProxyError::TransferAlreadyInProgress`] while another attempt is pending
    /// - [`ProxyError::AlreadyConnected`] if `target` is the active server
    /// - [`ProxyError::SessionAlreadyClosed`] once the player is gone
    pub fn connect(self: &Arc<Self>, target: Arc<ServerInfo>) -> Result<Arc<TransferCallback>> {
        if self.is_disconnected() {
            return Err(ProxyError::SessionAlreadyClosed);
        }

        let mut pending = self.pending.lock();
        if pending.is_some() {
            return Err(ProxyError::TransferAlreadyInProgress(self.name.clone()));
        }

        let current = self.server();
        if let Some(current) = &current {
            if current.info().name().eq_ignore_ascii_case(target.name()) {
                return Err(ProxyError::AlreadyConnected {
                    player: self.name.clone(),
                    server: target.name().to_string(),
                });
            }
        }

        let callback = TransferCallback::new(self, target, current.is_none());
        if let Some(current) = &current {
            let bridge = Arc::new(TransferBatchBridge::new(self, BridgeRole::Old));
            current.downstream().session().set_batch_handler(bridge.clone());
            callback.set_old_bridge(bridge);
        }
        *pending = Some(callback.clone());
        drop(pending);

        tracing::info!(
            "[{}|{}] -> Connecting to {}",
            self.upstream.address(),
            self.name,
            callback.target().name()
        );
        tokio::spawn(callback.clone().run());
        Ok(callback)
    }

    /// Abandon the pending transfer
    ///
    /// # Errors
    /// [`ProxyError::InvalidState`] if nothing is pending or the target has
    /// already accepted the player
    pub fn cancel_transfer(&self) -> Result<()> {
        let callback = self
            .pending_transfer()
            .ok_or_else(|| ProxyError::InvalidState(format!("{} has no pending transfer", self.name)))?;
        callback.cancel()
    }

    /// Drop the player: tell the client, close every backend link
    ///
    /// Idempotent.
    pub fn disconnect(&self, reason: Option<&str>) {
        if self.disconnected.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(
            "[{}|{}] -> Disconnected: {}",
            self.upstream.address(),
            self.name,
            reason.unwrap_or("no reason")
        );

        let pending = self.pending.lock().take();
        if let Some(callback) = pending {
            callback.abort(ProxyError::SessionAlreadyClosed);
        }

        self.upstream.disconnect(reason);

        let server = self.server();
        if let Some(server) = server {
            server.info().remove_player(self.id);
            server.disconnect(false);
        }

        self.context.players.remove_player(self.id);
        self.context.events.emit(ProxyEvent::PlayerDisconnect {
            player: self.id,
            name: self.name.clone(),
            reason: reason.map(String::from),
        });
    }

    /// Phase of the pending transfer, if any
    pub fn transfer_phase(&self) -> Option<TransferPhase> {
        self.pending_transfer().map(|callback| callback.phase())
    }
}
