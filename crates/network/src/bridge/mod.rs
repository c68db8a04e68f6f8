//! # Packet Bridges
//!
//! A bridge is the batch handler installed on one session. It decodes every
//! frame of a batch, lets the hooks rewrite or veto each packet, and forwards
//! the surviving frames to the peer session as one batch.
//!
//! Per frame, hooks run in this order:
//!
//! 1. the session's packet handler (world-state tracking, transfer detection)
//! 2. the bridge's own rewrite step (identifier maps, tracking)
//! 3. the optional plugin handler
//!
//! Any hook may return [`CancelSignal`] to drop that single packet. Frames
//! that no hook changed are forwarded as their original bytes; frames that
//! fail to decode are forwarded untouched.

mod downstream;
mod transfer;
mod upstream;

pub use downstream::DownstreamBridge;
pub use transfer::{BridgeRole, TransferBatchBridge};
pub use upstream::UpstreamBridge;

use bytes::Bytes;
use tideway_protocol::Packet;

use crate::transport::Session;

/// Drop the current packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("packet cancelled")]
pub struct CancelSignal;

/// Per-packet hook installed on a session
pub trait PacketHandler: Send + Sync {
    /// Inspect or mutate a packet
    ///
    /// Returns `Ok(true)` when the packet was modified and must be re-encoded.
    fn handle_packet(&self, packet: &mut Packet) -> Result<bool, CancelSignal>;

    /// The session this handler is installed on was closed by its peer
    fn on_disconnect(&self, _reason: &str) {}
}

/// Decode, run hooks and re-encode one batch
///
/// The session's packet handler is fetched again for every frame, so a hook
/// that replaces it takes effect for the rest of the batch.
pub fn translate_batch<F>(
    source: &dyn Session,
    batch: Vec<Bytes>,
    mut rewrite: F,
    plugin: Option<&dyn PacketHandler>,
) -> Vec<Bytes>
where
    F: FnMut(&mut Packet) -> Result<bool, CancelSignal>,
{
    let mut out = Vec::with_capacity(batch.len());

    for frame in batch {
        let mut packet = match Packet::decode(frame.clone()) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::debug!("Passing through undecodable frame from {}: {}", source.address(), e);
                out.push(frame);
                continue;
            }
        };

        let handled = run_hooks(source, &mut packet, &mut rewrite, plugin);
        match handled {
            Ok(true) => out.push(packet.encode()),
            Ok(false) => out.push(frame),
            Err(CancelSignal) => {
                tracing::trace!("Cancelled packet {} from {}", packet.id(), source.address());
            }
        }
    }

    out
}

fn run_hooks<F>(
    source: &dyn Session,
    packet: &mut Packet,
    rewrite: &mut F,
    plugin: Option<&dyn PacketHandler>,
) -> Result<bool, CancelSignal>
where
    F: FnMut(&mut Packet) -> Result<bool, CancelSignal>,
{
    let mut changed = false;
    if let Some(handler) = source.packet_handler() {
        changed |= handler.handle_packet(packet)?;
    }
    changed |= rewrite(packet)?;
    if let Some(plugin) = plugin {
        changed |= plugin.handle_packet(packet)?;
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemorySession;
    use std::sync::Arc;

    struct DropStatus;

    impl PacketHandler for DropStatus {
        fn handle_packet(&self, packet: &mut Packet) -> Result<bool, CancelSignal> {
            match packet {
                Packet::PlayStatus { .. } => Err(CancelSignal),
                _ => Ok(false),
            }
        }
    }

    #[test]
    fn test_cancel_drops_only_that_packet() {
        let session = MemorySession::new("127.0.0.1:19133".parse().unwrap());
        session.set_packet_handler(Arc::new(DropStatus));

        let batch = vec![
            Packet::ChunkRadiusUpdated { radius: 4 }.encode(),
            Packet::PlayStatus { status: 3 }.encode(),
            Packet::RequestChunkRadius { radius: 6 }.encode(),
        ];
        let out = translate_batch(&*session, batch.clone(), |_| Ok(false), None);

        assert_eq!(out, vec![batch[0].clone(), batch[2].clone()]);
    }

    #[test]
    fn test_undecodable_frame_passes_through() {
        let session = MemorySession::new("127.0.0.1:19133".parse().unwrap());
        // PlayStatus id followed by an unterminated varint
        let broken = Bytes::from_static(&[0x02, 0x80]);
        let batch = vec![broken.clone(), Packet::ChunkRadiusUpdated { radius: 4 }.encode()];

        let out = translate_batch(&*session, batch, |_| Ok(false), None);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], broken);
    }

    #[test]
    fn test_rewritten_packet_is_reencoded() {
        let session = MemorySession::new("127.0.0.1:19133".parse().unwrap());
        let batch = vec![Packet::RemoveEntity { unique_entity_id: 7 }.encode()];

        let out = translate_batch(
            &*session,
            batch,
            |packet| match packet {
                Packet::RemoveEntity { unique_entity_id } => {
                    *unique_entity_id = 1;
                    Ok(true)
                }
                _ => Ok(false),
            },
            None,
        );
        assert_eq!(Packet::decode(out[0].clone()).unwrap(), Packet::RemoveEntity { unique_entity_id: 1 });
    }
}
