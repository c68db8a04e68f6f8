use bytes::Bytes;
use std::sync::{Arc, Weak};
use tideway_core::Direction;
use tideway_protocol::Packet;

use super::translate_batch;
use crate::player::ProxiedPlayer;
use crate::transport::{BatchHandler, Session};

/// Client to backend
///
/// Always forwards to the player's active server, read together with its
/// rewrite map in one step.
pub struct UpstreamBridge {
    player: Weak<ProxiedPlayer>,
}

impl UpstreamBridge {
    pub fn new(player: &Arc<ProxiedPlayer>) -> Self {
        Self {
            player: Arc::downgrade(player),
        }
    }
}

impl BatchHandler for UpstreamBridge {
    fn handle(&self, source: &dyn Session, batch: Vec<Bytes>) {
        let Some(player) = self.player.upgrade() else {
            return;
        };
        let link = player.link();
        let Some(server) = link.server.clone() else {
            tracing::debug!("Dropping batch from {}: no downstream yet", player.name());
            return;
        };

        let plugin = player.plugin_upstream_handler();
        let mut requested_radius = None;
        let frames = translate_batch(
            source,
            batch,
            |packet| {
                if let Packet::RequestChunkRadius { radius } = packet {
                    requested_radius = Some(*radius);
                }
                Ok(link.rewrite.rewrite_packet(packet, Direction::Upstream))
            },
            plugin.as_deref(),
        );

        if let Some(radius) = requested_radius {
            player.update_rewrite(|rewrite| rewrite.chunk_radius = Some(radius));
        }
        server.send_batch(frames);
    }

    fn on_disconnect(&self, _source: &dyn Session, reason: &str) {
        if let Some(player) = self.player.upgrade() {
            player.disconnect(Some(reason));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{CancelSignal, PacketHandler};
    use crate::test_support::Harness;

    /// Caps the view distance and hides initialization from the backend
    struct CapRadius;

    impl PacketHandler for CapRadius {
        fn handle_packet(&self, packet: &mut Packet) -> Result<bool, CancelSignal> {
            match packet {
                Packet::RequestChunkRadius { radius } if *radius > 8 => {
                    *radius = 8;
                    Ok(true)
                }
                Packet::SetLocalPlayerAsInitialized { .. } => Err(CancelSignal),
                _ => Ok(false),
            }
        }
    }

    #[tokio::test]
    async fn test_plugin_handler_vetoes_and_mutates() {
        let harness = Harness::new();
        let player = harness.joined_player("lobby").await;
        let lobby = harness.backend("lobby");
        lobby.clear_sent();

        player.set_plugin_upstream_handler(Some(Arc::new(CapRadius)));
        harness.upstream.inject_batch(&[
            Packet::SetLocalPlayerAsInitialized { runtime_entity_id: 1 },
            Packet::RequestChunkRadius { radius: 12 },
            Packet::RequestChunkRadius { radius: 4 },
        ]);
        assert_eq!(
            lobby.sent_packets(),
            vec![
                Packet::RequestChunkRadius { radius: 8 },
                Packet::RequestChunkRadius { radius: 4 }
            ]
        );

        player.set_plugin_upstream_handler(None);
        lobby.clear_sent();
        harness.upstream.inject_batch(&[Packet::SetLocalPlayerAsInitialized { runtime_entity_id: 1 }]);
        assert_eq!(
            lobby.sent_packets(),
            vec![Packet::SetLocalPlayerAsInitialized { runtime_entity_id: 1 }]
        );
    }
}
