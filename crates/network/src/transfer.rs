//! # Transfer State Machine
//!
//! Moves a connected player from one backend to another without closing the
//! client connection.
//!
//! ```text
//! Requested -> Connecting -> Accepted -> Completing -> Done
//!                   |            |
//!                   +-> Failed <-+
//! ```
//!
//! - **Connecting**: bind and connect a second downstream on its own task.
//!   The old backend keeps playing; any failure here is invisible to the
//!   client.
//! - **Accepted**: the target sent `StartGame`. The old link is held and the
//!   client's world is wiped: fake dimension change, respawn at the target
//!   spawn, effects, weather, game rules.
//! - **Completing**: the target reports the player spawned. The link is
//!   swapped in one step, the old backend is closed gracefully and the held
//!   queues are flushed.
//!
//! The initial join uses the same callback but skips straight from
//! `Connecting` to `Done` once the first backend is attached.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tideway_core::{PlayerId, ProxyError, Result};
use tideway_protocol::{build_local_player_initialized, build_request_chunk_radius, build_stop_portal_sound, StartGame};
use tokio::sync::watch;

use crate::bridge::{DownstreamBridge, TransferBatchBridge};
use crate::connection::ServerConnection;
use crate::downstream::DownstreamConnection;
use crate::events::ProxyEvent;
use crate::player::ProxiedPlayer;
use crate::rewrite::inject::*;
use crate::rewrite::RewriteData;
use crate::server::ProxyContext;
use crate::server_info::ServerInfo;
use crate::transport::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransferPhase {
    Requested,
    Connecting,
    Accepted,
    Completing,
    Done,
    Failed,
}

impl TransferPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

pub struct TransferCallback {
    player: Weak<ProxiedPlayer>,
    player_id: PlayerId,
    target: Arc<ServerInfo>,
    initial: bool,
    phase: watch::Sender<TransferPhase>,
    connection: Mutex<Option<Arc<dyn DownstreamConnection>>>,
    old_bridge: Mutex<Option<Arc<TransferBatchBridge>>>,
    new_bridge: Mutex<Option<Arc<TransferBatchBridge>>>,
    /// Map for the target, built at accept and installed at completion
    pending_rewrite: Mutex<Option<RewriteData>>,
    failure: Mutex<Option<String>>,
}

impl TransferCallback {
    pub(crate) fn new(player: &Arc<ProxiedPlayer>, target: Arc<ServerInfo>, initial: bool) -> Arc<Self> {
        let (phase, _) = watch::channel(TransferPhase::Requested);
        Arc::new(Self {
            player: Arc::downgrade(player),
            player_id: player.id(),
            target,
            initial,
            phase,
            connection: Mutex::new(None),
            old_bridge: Mutex::new(None),
            new_bridge: Mutex::new(None),
            pending_rewrite: Mutex::new(None),
            failure: Mutex::new(None),
        })
    }

    pub fn target(&self) -> &Arc<ServerInfo> {
        &self.target
    }

    pub fn is_initial(&self) -> bool {
        self.initial
    }

    pub fn phase(&self) -> TransferPhase {
        *self.phase.borrow()
    }

    /// Why the transfer failed, once it has
    pub fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }

    /// Wait until the phase satisfies `predicate`
    pub async fn wait_until<F>(&self, predicate: F) -> TransferPhase
    where
        F: Fn(TransferPhase) -> bool,
    {
        let mut rx = self.phase.subscribe();
        let result = rx.wait_for(|phase| predicate(*phase)).await.map(|phase| *phase);
        result.unwrap_or_else(|_| self.phase())
    }

    /// Wait for `Done` or `Failed`
    pub async fn finished(&self) -> TransferPhase {
        self.wait_until(TransferPhase::is_terminal).await
    }

    pub fn connection(&self) -> Option<Arc<dyn DownstreamConnection>> {
        self.connection.lock().clone()
    }

    pub(crate) fn set_old_bridge(&self, bridge: Arc<TransferBatchBridge>) {
        *self.old_bridge.lock() = Some(bridge);
    }

    pub(crate) fn set_new_bridge(&self, bridge: Arc<TransferBatchBridge>) {
        *self.new_bridge.lock() = Some(bridge);
    }

    #[cfg(test)]
    fn bridges(&self) -> (Option<Arc<TransferBatchBridge>>, Option<Arc<TransferBatchBridge>>) {
        (self.old_bridge.lock().clone(), self.new_bridge.lock().clone())
    }

    fn advance(&self, from: TransferPhase, to: TransferPhase) -> bool {
        self.phase.send_if_modified(|phase| {
            if *phase == from {
                *phase = to;
                true
            } else {
                false
            }
        })
    }

    /// Bind, connect and hand the session to the downstream connection
    pub(crate) async fn run(self: Arc<Self>) {
        if !self.advance(TransferPhase::Requested, TransferPhase::Connecting) {
            return;
        }
        let Some(player) = self.player.upgrade() else {
            return;
        };
        let context = player.context().clone();

        let connection = self.target.bind_new_connection(context.transport.clone());
        *self.connection.lock() = Some(connection.clone());
        if self.phase() != TransferPhase::Connecting {
            connection.close(true);
            return;
        }

        match self.establish(&connection, &player, &context).await {
            Ok(()) if self.phase() == TransferPhase::Connecting => {
                connection.on_downstream_connected(&player);
            }
            Ok(()) => connection.close(true),
            Err(e) => self.on_transfer_failed(e),
        }
    }

    async fn establish(
        &self,
        connection: &Arc<dyn DownstreamConnection>,
        player: &ProxiedPlayer,
        context: &ProxyContext,
    ) -> Result<()> {
        connection.bind(player.protocol()).await?;
        if self.phase() != TransferPhase::Connecting {
            return Err(ProxyError::TransferCancelled(self.target.name().to_string()));
        }
        connection
            .connect(self.target.address(), context.config.connect_timeout)
            .await?;
        Ok(())
    }

    /// The first backend is attached; nothing to swap
    pub(crate) fn on_initial_connected(&self) {
        if self.advance(TransferPhase::Connecting, TransferPhase::Done) {
            if let Some(player) = self.player.upgrade() {
                player.clear_pending(self);
            }
        }
    }

    /// The target sent `StartGame`: hold the old link and wipe the client's world
    pub fn on_transfer_accepted(&self, start_game: &StartGame) {
        if !self.advance(TransferPhase::Connecting, TransferPhase::Accepted) {
            return;
        }
        let Some(player) = self.player.upgrade() else {
            return;
        };
        tracing::info!("[{}] Transfer to {} accepted", player.name(), self.target.name());

        if let Some(bridge) = self.old_bridge.lock().as_ref() {
            bridge.hold();
        }
        player.set_accept_play_status(false);

        let rewrite = player.rewrite().for_transfer(start_game);
        let upstream: Option<&dyn Session> = Some(&**player.upstream());

        let tracked = player.take_tracked();
        let own_uuid = player.uuid();
        inject_remove_entities(upstream, tracked.entities);
        inject_remove_bossbars(upstream, tracked.bossbars);
        inject_remove_objectives(upstream, tracked.objectives);
        inject_remove_players(upstream, tracked.players.into_iter().filter(|uuid| *uuid != own_uuid));

        inject_dimension_change(upstream, rewrite.dimension, rewrite.spawn_position);
        inject_position(upstream, rewrite.entity_id, rewrite.spawn_position, rewrite.rotation);
        inject_remove_all_effects(upstream, rewrite.entity_id);
        inject_clear_weather(upstream);
        inject_game_rules(upstream, &rewrite.game_rules);
        inject_game_mode(upstream, rewrite.game_mode);
        inject_difficulty(upstream, rewrite.difficulty);

        if let Some(bridge) = self.new_bridge.lock().as_ref() {
            bridge.pin(Arc::new(rewrite.clone()));
        }
        *self.pending_rewrite.lock() = Some(rewrite);
    }

    /// The target reports the player spawned: swap the link and release the queues
    pub fn on_transfer_complete(&self) {
        if !self.advance(TransferPhase::Accepted, TransferPhase::Completing) {
            return;
        }
        let Some(player) = self.player.upgrade() else {
            return;
        };
        let connection = self.connection.lock().clone();
        let Some((connection, session)) = connection.and_then(|c| c.session().map(|s| (c, s))) else {
            self.finish_failed(
                &player,
                TransferPhase::Completing,
                ProxyError::InvalidState("transfer target has no session".into()),
            );
            return;
        };

        let mut rewrite = self
            .pending_rewrite
            .lock()
            .take()
            .unwrap_or_else(|| player.rewrite().as_ref().clone());
        if let Some(radius) = player.rewrite().chunk_radius {
            rewrite.chunk_radius = Some(radius);
        }

        let upstream = player.upstream();
        inject_chunk_publisher_update(
            Some(&**upstream),
            rewrite.spawn_position.to_int(),
            rewrite.chunk_radius_size(),
        );
        session.send_packet(&build_local_player_initialized(rewrite.backend_entity_id));
        if let Some(radius) = rewrite.chunk_radius {
            session.send_packet(&build_request_chunk_radius(radius));
        }
        if !upstream.is_closed() {
            upstream.send_packet_immediately(&build_stop_portal_sound());
        }

        let server = Arc::new(ServerConnection::new(self.target.clone(), connection, session.clone()));
        let old = player.install_link(server.clone(), Arc::new(rewrite));
        if let Some(old) = &old {
            old.info().remove_player(player.id());
        }
        self.target.add_player(player.id());
        if let Some(old) = &old {
            old.disconnect(false);
        }

        session.on_downstream_initialize(&player, &server);
        session.on_transfer_completed(&player, &server);

        if let Some(bridge) = self.old_bridge.lock().take() {
            bridge.retire();
        }
        if let Some(bridge) = self.new_bridge.lock().take() {
            bridge.release();
        }

        player.set_accept_play_status(true);
        player.clear_pending(self);
        self.advance(TransferPhase::Completing, TransferPhase::Done);

        let old_name = old.map(|old| old.info().name().to_string()).unwrap_or_default();
        tracing::info!("[{}] Transfer {} -> {} complete", player.name(), old_name, self.target.name());
        player.context().events.emit(ProxyEvent::TransferComplete {
            player: player.id(),
            old: old_name,
            new: self.target.name().to_string(),
        });
    }

    /// Abandon the transfer after an error
    pub fn on_transfer_failed(&self, error: ProxyError) {
        let Some(previous) = self.terminate(&error) else {
            return;
        };
        if let Some(player) = self.player.upgrade() {
            self.report_failure(&player, previous, error);
        }
    }

    /// Abandon before the target accepted the player
    ///
    /// # Errors
    /// [`ProxyError::InvalidState`] once the transfer was accepted
    pub fn cancel(&self) -> Result<()> {
        let phase = self.phase();
        if phase >= TransferPhase::Accepted {
            return Err(ProxyError::InvalidState(format!(
                "transfer to {} is already {:?}",
                self.target.name(),
                phase
            )));
        }
        let error = ProxyError::TransferCancelled(self.target.name().to_string());
        match self.terminate_before_accept(&error) {
            Some(previous) => {
                if let Some(player) = self.player.upgrade() {
                    self.report_failure(&player, previous, error);
                }
                Ok(())
            }
            None => Err(ProxyError::InvalidState(format!(
                "transfer to {} can no longer be cancelled",
                self.target.name()
            ))),
        }
    }

    /// The player is leaving; tear down without touching the old link
    pub(crate) fn abort(&self, error: ProxyError) {
        self.terminate(&error);
    }

    fn finish_failed(&self, player: &Arc<ProxiedPlayer>, from: TransferPhase, error: ProxyError) {
        if self.advance(from, TransferPhase::Failed) {
            self.cleanup(&error);
            self.report_failure(player, from, error);
        }
    }

    /// Move to `Failed` unless already terminal; returns the phase left
    fn terminate(&self, error: &ProxyError) -> Option<TransferPhase> {
        self.terminate_where(error, |phase| !phase.is_terminal() && phase != TransferPhase::Completing)
    }

    fn terminate_before_accept(&self, error: &ProxyError) -> Option<TransferPhase> {
        self.terminate_where(error, |phase| phase < TransferPhase::Accepted)
    }

    fn terminate_where<F>(&self, error: &ProxyError, allowed: F) -> Option<TransferPhase>
    where
        F: Fn(TransferPhase) -> bool,
    {
        let mut previous = None;
        self.phase.send_if_modified(|phase| {
            if allowed(*phase) {
                previous = Some(*phase);
                *phase = TransferPhase::Failed;
                true
            } else {
                false
            }
        });
        if previous.is_some() {
            self.cleanup(error);
        }
        previous
    }

    fn cleanup(&self, error: &ProxyError) {
        *self.failure.lock() = Some(error.to_string());
        if let Some(connection) = self.connection.lock().take() {
            connection.close(true);
        }
        self.new_bridge.lock().take();
        self.pending_rewrite.lock().take();
    }

    fn report_failure(&self, player: &Arc<ProxiedPlayer>, previous: TransferPhase, error: ProxyError) {
        tracing::warn!(
            "[{}|{}] -> Connection to {} failed: {}",
            player.upstream().address(),
            player.name(),
            self.target.name(),
            error
        );
        player.clear_pending(self);
        player.context().events.emit(ProxyEvent::ServerConnectFailed {
            player: self.player_id,
            target: self.target.name().to_string(),
            reason: error.to_string(),
        });

        if previous >= TransferPhase::Accepted {
            // The client's world is already gone; only a reconnect recovers it
            self.old_bridge.lock().take();
            player.disconnect(Some(&format!("Transfer to {} failed: {}", self.target.name(), error)));
            return;
        }

        let old_bridge = self.old_bridge.lock().take();
        if self.initial {
            return;
        }
        match player.server() {
            Some(server) if server.is_connected() => {
                if old_bridge.is_some() {
                    server
                        .downstream()
                        .session()
                        .set_batch_handler(Arc::new(DownstreamBridge::new(player, &server)));
                }
            }
            _ => player.disconnect(Some("Lost connection to the current server")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{start_game, Harness};
    use tideway_core::Vector3f;
    use tideway_protocol::{dimension, play_status, ItemEntry, Packet, PacketId};

    fn ids(packets: &[Packet]) -> Vec<u32> {
        packets.iter().map(Packet::id).collect()
    }

    fn position_of(packets: &[Packet], id: PacketId) -> usize {
        packets
            .iter()
            .position(|packet| packet.id() == id.as_u32())
            .unwrap_or_else(|| panic!("{:?} not sent", id))
    }

    #[tokio::test]
    async fn test_second_request_is_rejected() {
        let harness = Harness::new();
        let player = harness.joined_player("lobby").await;

        let first = player.connect(harness.server("survival")).unwrap();
        let second = player.connect(harness.server("survival"));
        assert!(matches!(second, Err(ProxyError::TransferAlreadyInProgress(_))));
        assert!(Arc::ptr_eq(&player.pending_transfer().unwrap(), &first));
    }

    #[tokio::test]
    async fn test_failed_connect_keeps_old_backend() {
        let harness = Harness::new();
        let mut events = harness.context.events.channel();
        let player = harness.joined_player("lobby").await;
        let before = player.link();
        harness.upstream.clear_sent();

        let callback = player.connect(harness.server("offline")).unwrap();
        assert_eq!(callback.finished().await, TransferPhase::Failed);

        let after = player.link();
        assert!(Arc::ptr_eq(before.server.as_ref().unwrap(), after.server.as_ref().unwrap()));
        assert!(Arc::ptr_eq(&before.rewrite, &after.rewrite));
        assert!(player.pending_transfer().is_none());
        assert!(harness.upstream.sent().is_empty());
        assert!(!harness.upstream.is_closed());

        // Old link forwards normally again
        let lobby = harness.backend("lobby");
        lobby.inject_batch(&[Packet::ChunkRadiusUpdated { radius: 6 }]);
        assert_eq!(harness.upstream.sent_packets(), vec![Packet::ChunkRadiusUpdated { radius: 6 }]);

        let failed = std::iter::from_fn(|| events.try_recv().ok())
            .any(|event| matches!(event, ProxyEvent::ServerConnectFailed { ref target, .. } if target == "offline"));
        assert!(failed);
    }

    #[tokio::test]
    async fn test_timeout_and_bind_failure_are_recoverable() {
        let harness = Harness::new();
        let player = harness.joined_player("lobby").await;

        let callback = player.connect(harness.server("slow")).unwrap();
        assert_eq!(callback.finished().await, TransferPhase::Failed);
        assert!(callback.failure().unwrap().contains("timed out"));

        harness.transport.set_fail_bind(true);
        let callback = player.connect(harness.server("survival")).unwrap();
        assert_eq!(callback.finished().await, TransferPhase::Failed);
        assert_eq!(harness.transport.session_count(harness.server("survival").address()), 0);

        assert_eq!(player.server().unwrap().info().name(), "lobby");
        assert!(!player.is_disconnected());
    }

    #[tokio::test]
    async fn test_transfer_end_to_end() {
        let harness = Harness::new();
        let mut events = harness.context.events.channel();
        let player = harness.joined_player("lobby").await;
        let lobby = harness.backend("lobby");
        let old_server = player.server().unwrap();
        harness.upstream.clear_sent();

        let callback = player.connect(harness.server("survival")).unwrap();
        let survival = harness.wait_for_backend("survival").await;
        assert!(matches!(survival.sent_packets()[0], Packet::Login { .. }));

        let mut target_game = start_game(77, dimension::OVERWORLD);
        target_game.item_palette = vec![ItemEntry::new("minecraft:shield", 360)];
        survival.inject_batch(&[Packet::StartGame(Box::new(target_game))]);
        assert_eq!(callback.phase(), TransferPhase::Accepted);
        let (old_bridge, new_bridge) = callback.bridges();
        let (old_bridge, new_bridge) = (old_bridge.unwrap(), new_bridge.unwrap());

        // Held traffic from both backends
        lobby.inject_batch(&[Packet::ChunkRadiusUpdated { radius: 5 }]);
        survival.inject_batch(&[Packet::SetEntityMotion {
            runtime_entity_id: 77,
            motion: Vector3f::ZERO,
        }]);
        assert_eq!(old_bridge.queued_batches(), 1);
        assert_eq!(new_bridge.queued_batches(), 1);
        let invalidation = harness.upstream.sent_packets();
        assert!(!invalidation
            .iter()
            .any(|packet| matches!(packet, Packet::ChunkRadiusUpdated { .. } | Packet::SetEntityMotion { .. })));

        let dimension_change = position_of(&invalidation, PacketId::ChangeDimension);
        let reposition = position_of(&invalidation, PacketId::MovePlayer);
        let effects = position_of(&invalidation, PacketId::MobEffect);
        let weather = position_of(&invalidation, PacketId::LevelEvent);
        let rules = position_of(&invalidation, PacketId::GameRulesChanged);
        assert!(dimension_change < reposition);
        assert!(reposition < effects);
        assert!(effects < weather);
        assert!(weather < rules);
        assert!(matches!(
            invalidation[dimension_change],
            Packet::ChangeDimension { dimension: dimension::NETHER, .. }
        ));

        survival.inject_batch(&[Packet::PlayStatus {
            status: play_status::PLAYER_SPAWN,
        }]);
        assert_eq!(callback.phase(), TransferPhase::Done);

        // Exactly one active server, the new one
        let active = player.server().unwrap();
        assert_eq!(active.info().name(), "survival");
        assert!(!old_server.is_connected());
        assert!(!lobby.closed_forcibly());
        assert!(player.pending_transfer().is_none());
        assert!(harness.server("survival").has_player(player.id()));
        assert!(!harness.server("lobby").has_player(player.id()));
        assert_eq!(old_bridge.queued_batches(), 0);
        assert_eq!(new_bridge.queued_batches(), 0);
        assert!(!new_bridge.is_held());
        assert_eq!(active.downstream().hardcoded_blocking_id(), Some(360));

        // Queues drained after the invalidation, old link first, ids rewritten
        let all = harness.upstream.sent_packets();
        assert!(!all.iter().any(|packet| matches!(packet, Packet::PlayStatus { .. })));
        let stop_sound = position_of(&all, PacketId::StopSound);
        let old_queued = position_of(&all, PacketId::ChunkRadiusUpdated);
        let new_queued = position_of(&all, PacketId::SetEntityMotion);
        assert!(rules < stop_sound && stop_sound < old_queued && old_queued < new_queued);
        assert!(matches!(all[new_queued], Packet::SetEntityMotion { runtime_entity_id: 1, .. }));

        // Target learned the player is ready
        let to_survival = ids(&survival.sent_packets());
        assert!(to_survival.contains(&PacketId::SetLocalPlayerAsInitialized.as_u32()));

        // Client traffic now reaches the new backend with its ids
        survival.clear_sent();
        harness.upstream.inject_batch(&[Packet::SetLocalPlayerAsInitialized { runtime_entity_id: 1 }]);
        assert_eq!(
            survival.sent_packets(),
            vec![Packet::SetLocalPlayerAsInitialized { runtime_entity_id: 77 }]
        );

        // The retired link drops late traffic
        let before = harness.upstream.sent().len();
        lobby.inject_batch(&[Packet::ChunkRadiusUpdated { radius: 9 }]);
        assert_eq!(harness.upstream.sent().len(), before);

        let complete = std::iter::from_fn(|| events.try_recv().ok()).find_map(|event| match event {
            ProxyEvent::TransferComplete { old, new, .. } => Some((old, new)),
            _ => None,
        });
        assert_eq!(complete, Some(("lobby".to_string(), "survival".to_string())));

        // A new request may begin
        assert!(player.connect(harness.server("lobby")).is_ok());
    }

    #[tokio::test]
    async fn test_cancel_before_accept() {
        let harness = Harness::new();
        let player = harness.joined_player("lobby").await;

        let callback = player.connect(harness.server("survival")).unwrap();
        let survival = harness.wait_for_backend("survival").await;
        player.cancel_transfer().unwrap();

        assert_eq!(callback.phase(), TransferPhase::Failed);
        assert!(survival.closed_forcibly());
        assert_eq!(player.server().unwrap().info().name(), "lobby");
        assert!(player.cancel_transfer().is_err());

        // Late StartGame from the abandoned target changes nothing
        survival.inject_batch(&[Packet::StartGame(Box::new(start_game(77, dimension::OVERWORLD)))]);
        assert_eq!(callback.phase(), TransferPhase::Failed);
    }

    #[tokio::test]
    async fn test_cannot_cancel_after_accept() {
        let harness = Harness::new();
        let player = harness.joined_player("lobby").await;

        let callback = player.connect(harness.server("survival")).unwrap();
        let survival = harness.wait_for_backend("survival").await;
        survival.inject_batch(&[Packet::StartGame(Box::new(start_game(77, dimension::OVERWORLD)))]);

        assert!(matches!(player.cancel_transfer(), Err(ProxyError::InvalidState(_))));
        assert_eq!(callback.phase(), TransferPhase::Accepted);
    }

    #[tokio::test]
    async fn test_target_disconnect_after_accept_forces_reconnect() {
        let harness = Harness::new();
        let player = harness.joined_player("lobby").await;

        let callback = player.connect(harness.server("survival")).unwrap();
        let survival = harness.wait_for_backend("survival").await;
        survival.inject_batch(&[Packet::StartGame(Box::new(start_game(77, dimension::OVERWORLD)))]);
        survival.remote_close("server stopped");

        assert_eq!(callback.phase(), TransferPhase::Failed);
        assert!(player.is_disconnected());
        assert!(harness.upstream.is_closed());
    }

    #[tokio::test]
    async fn test_target_kick_before_accept_keeps_player() {
        let harness = Harness::new();
        let player = harness.joined_player("lobby").await;

        let callback = player.connect(harness.server("survival")).unwrap();
        let survival = harness.wait_for_backend("survival").await;
        survival.inject_batch(&[Packet::Disconnect {
            hide_screen: false,
            message: "whitelist".into(),
        }]);

        assert_eq!(callback.phase(), TransferPhase::Failed);
        assert!(callback.failure().unwrap().contains("whitelist"));
        assert!(!player.is_disconnected());
        assert_eq!(player.server().unwrap().info().name(), "lobby");
    }

    #[tokio::test]
    async fn test_transfer_replays_client_chunk_radius() {
        let harness = Harness::new();
        let player = harness.joined_player("lobby").await;
        let lobby = harness.backend("lobby");

        harness.upstream.inject_batch(&[Packet::RequestChunkRadius { radius: 12 }]);
        lobby.inject_batch(&[Packet::ChunkRadiusUpdated { radius: 6 }]);
        assert_eq!(player.rewrite().chunk_radius, Some(12));

        let callback = player.connect(harness.server("survival")).unwrap();
        let survival = harness.wait_for_backend("survival").await;
        survival.inject_batch(&[Packet::StartGame(Box::new(start_game(77, dimension::OVERWORLD)))]);
        survival.inject_batch(&[Packet::PlayStatus {
            status: play_status::PLAYER_SPAWN,
        }]);
        assert_eq!(callback.phase(), TransferPhase::Done);

        let requested: Vec<Packet> = survival
            .sent_packets()
            .into_iter()
            .filter(|packet| matches!(packet, Packet::RequestChunkRadius { .. }))
            .collect();
        assert_eq!(requested, vec![Packet::RequestChunkRadius { radius: 12 }]);
        assert!(harness
            .upstream
            .sent_packets()
            .contains(&Packet::NetworkChunkPublisherUpdate {
                position: tideway_core::Vector3i::new(0, 64, 0),
                radius: 12 * 16,
            }));
    }
}
