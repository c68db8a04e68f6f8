use bytes::Bytes;
use std::sync::{Arc, Weak};
use tideway_core::Direction;
use tideway_protocol::{play_status, Packet};

use super::{translate_batch, CancelSignal};
use crate::connection::ServerConnection;
use crate::player::ProxiedPlayer;
use crate::rewrite::RewriteData;
use crate::transport::{BatchHandler, Session};

/// Backend to client, on the active link
pub struct DownstreamBridge {
    player: Weak<ProxiedPlayer>,
    server: Weak<ServerConnection>,
}

impl DownstreamBridge {
    pub fn new(player: &Arc<ProxiedPlayer>, server: &Arc<ServerConnection>) -> Self {
        Self {
            player: Arc::downgrade(player),
            server: Arc::downgrade(server),
        }
    }
}

/// Rewrite step shared by every bridge writing to the client
///
/// Translates ids, records what the backend created on the client and drops
/// spawn statuses while a transfer is settling.
pub(crate) fn rewrite_downstream(
    player: &ProxiedPlayer,
    rewrite: Option<&RewriteData>,
    packet: &mut Packet,
    track: bool,
) -> Result<bool, CancelSignal> {
    if let Packet::PlayStatus { status } = packet {
        if *status == play_status::PLAYER_SPAWN && !player.accepts_play_status() {
            return Err(CancelSignal);
        }
    }

    let changed = rewrite.is_some_and(|rewrite| rewrite.rewrite_packet(packet, Direction::Downstream));
    if track {
        player.track(packet);
    }
    Ok(changed)
}

impl BatchHandler for DownstreamBridge {
    fn handle(&self, source: &dyn Session, batch: Vec<Bytes>) {
        let Some(player) = self.player.upgrade() else {
            return;
        };
        let link = player.link();

        let frames = translate_batch(
            source,
            batch,
            |packet| rewrite_downstream(&player, Some(&link.rewrite), packet, true),
            None,
        );
        if !frames.is_empty() {
            player.upstream().send_batch(frames);
        }
    }

    fn on_disconnect(&self, _source: &dyn Session, reason: &str) {
        let Some(player) = self.player.upgrade() else {
            return;
        };
        // Only the active backend takes the player down with it
        let active = match (player.server(), self.server.upgrade()) {
            (Some(current), Some(ours)) => Arc::ptr_eq(&current, &ours),
            _ => false,
        };
        if active {
            tracing::info!("[{}] Downstream closed: {}", player.name(), reason);
            player.disconnect(Some(reason));
        }
    }
}
