//! Player to backend attachment

use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tideway_protocol::Packet;

use crate::downstream::{DownstreamConnection, DownstreamSession};
use crate::server_info::ServerInfo;

/// "This player is attached to this backend"
///
/// Replaced, never mutated, when the player transfers.
pub struct ServerConnection {
    info: Arc<ServerInfo>,
    connection: Arc<dyn DownstreamConnection>,
    downstream: Arc<dyn DownstreamSession>,
}

impl ServerConnection {
    pub fn new(
        info: Arc<ServerInfo>,
        connection: Arc<dyn DownstreamConnection>,
        downstream: Arc<dyn DownstreamSession>,
    ) -> Self {
        Self {
            info,
            connection,
            downstream,
        }
    }

    pub fn info(&self) -> &Arc<ServerInfo> {
        &self.info
    }

    pub fn connection(&self) -> &Arc<dyn DownstreamConnection> {
        &self.connection
    }

    pub fn downstream(&self) -> &Arc<dyn DownstreamSession> {
        &self.downstream
    }

    pub fn address(&self) -> SocketAddr {
        self.downstream.address()
    }

    pub fn send_packet(&self, packet: &Packet) {
        if !self.downstream.is_closed() {
            self.downstream.send_packet(packet);
        }
    }

    pub fn send_batch(&self, frames: Vec<Bytes>) {
        if !self.downstream.is_closed() && !frames.is_empty() {
            self.downstream.send_batch(frames);
        }
    }

    /// Close the backend link; graceful unless `force`
    pub fn disconnect(&self, force: bool) {
        tracing::debug!("Disconnecting from {} (force={})", self.info.name(), force);
        self.connection.close(force);
    }

    pub fn is_connected(&self) -> bool {
        !self.downstream.is_closed()
    }
}
