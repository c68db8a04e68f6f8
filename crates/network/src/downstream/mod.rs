//! # Downstream Connections
//!
//! A [`DownstreamConnection`] is one attempt to reach one backend; once
//! connected it hands out a [`DownstreamSession`], the live link. A player
//! owns one of each, and briefly two of each while transferring.
//!
//! ## Connection state machine
//!
//! ```text
//! Unbound -> Bound -> Connecting -> Connected -> Closed
//! ```
//!
//! `Closed` is terminal and reachable from every state. Sends after `Closed`
//! are silent no-ops.

pub mod bedrock;

use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tideway_core::{ProtocolVersion, ProxyError, Result};
use tideway_protocol::Packet;

use crate::connection::ServerConnection;
use crate::player::ProxiedPlayer;
use crate::server_info::ServerInfo;
use crate::transport::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unbound,
    Bound,
    Connecting,
    Connected,
    Closed,
}

#[async_trait]
pub trait DownstreamConnection: Send + Sync {
    /// Reserve local transport resources
    ///
    /// # Errors
    /// [`ProxyError::BindFailure`] if nothing could be bound
    async fn bind(&self, protocol: ProtocolVersion) -> Result<()>;

    /// Open the session to `address`
    ///
    /// # Errors
    /// - [`ProxyError::ConnectTimeout`] / [`ProxyError::ConnectRefused`] from the transport
    /// - [`ProxyError::InvalidState`] if not bound, or closed meanwhile
    async fn connect(&self, address: SocketAddr, timeout: Duration) -> Result<Arc<dyn DownstreamSession>>;

    /// Wire the freshly connected session into the player
    ///
    /// The first backend of a player gets the initial handler set, any later
    /// one the transfer handler set.
    fn on_downstream_connected(self: Arc<Self>, player: &Arc<ProxiedPlayer>);

    fn send_packet(&self, packet: &Packet);
    fn send_packet_immediately(&self, packet: &Packet);

    /// Local address, once bound
    fn bind_address(&self) -> Option<SocketAddr>;

    /// Release everything; graceful unless `force`. Idempotent.
    fn close(&self, force: bool);

    fn server_info(&self) -> &Arc<ServerInfo>;
    fn session(&self) -> Option<Arc<dyn DownstreamSession>>;
    fn state(&self) -> ConnectionState;
}

pub trait DownstreamSession: Send + Sync {
    /// The player is now attached to this backend: install world tracking
    fn on_downstream_initialize(&self, player: &Arc<ProxiedPlayer>, server: &Arc<ServerConnection>);

    /// A transfer to this backend finished: install the normal bridges
    fn on_transfer_completed(&self, player: &Arc<ProxiedPlayer>, server: &Arc<ServerConnection>);

    fn address(&self) -> SocketAddr;
    fn latency(&self) -> Duration;

    fn send_packet(&self, packet: &Packet);
    fn send_packet_immediately(&self, packet: &Packet);
    fn send_batch(&self, frames: Vec<Bytes>);

    fn enable_encryption(&self, _key: &[u8]) -> Result<()> {
        Err(ProxyError::InvalidState("transport does not support encryption".into()))
    }

    fn is_encrypted(&self) -> bool {
        false
    }

    /// Shield runtime id used by the backend, kept in sync across backends
    fn set_hardcoded_blocking_id(&self, runtime_id: Option<i32>);
    fn hardcoded_blocking_id(&self) -> Option<i32>;

    fn is_closed(&self) -> bool;
    fn disconnect(&self);

    /// Underlying transport session
    fn session(&self) -> &Arc<dyn Session>;

    fn is_bedrock(&self) -> bool {
        false
    }
}
