//! # Transport Layer
//!
//! The raw, batch-oriented session abstraction the rest of the proxy is
//! written against. A transport moves whole batches of encoded packet frames;
//! it knows nothing about players, bridges or transfers.
//!
//! ## Implementations
//!
//! - [`tcp`] - length-delimited batches over TCP, periodic flush of queued packets
//! - [`memory`] - in-process sessions that record every write (used by tests)
//!
//! ## Ordering
//!
//! Writes on one session reach the peer in call order. Inbound batches are
//! delivered to the installed [`BatchHandler`] one at a time, in arrival
//! order, from a single task per session.

pub mod memory;
pub mod tcp;

use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tideway_core::{ProtocolVersion, Result};
use tideway_protocol::Packet;

use crate::bridge::PacketHandler;

/// Receives every inbound batch of a session
pub trait BatchHandler: Send + Sync {
    /// Handle one batch of encoded frames, in wire order
    fn handle(&self, source: &dyn Session, batch: Vec<Bytes>);

    /// Called once when the remote end closes the session
    ///
    /// Not called for closes initiated locally through [`Session::disconnect`].
    fn on_disconnect(&self, _source: &dyn Session, _reason: &str) {}
}

/// One live connection (client-facing or backend-facing)
pub trait Session: Send + Sync {
    /// Remote address
    fn address(&self) -> SocketAddr;

    /// Last measured round-trip time
    fn latency(&self) -> Duration;

    /// Queue a packet; it leaves with the next flush
    ///
    /// No-op once the session is closed.
    fn send_packet(&self, packet: &Packet);

    /// Write a packet now, as its own batch, without waiting for a flush
    ///
    /// Anything already queued is written first. No-op once closed.
    fn send_packet_immediately(&self, packet: &Packet);

    /// Write one already-encoded batch, after anything already queued
    ///
    /// No-op once closed.
    fn send_batch(&self, frames: Vec<Bytes>);

    fn set_batch_handler(&self, handler: Arc<dyn BatchHandler>);
    fn batch_handler(&self) -> Option<Arc<dyn BatchHandler>>;

    fn set_packet_handler(&self, handler: Arc<dyn PacketHandler>);
    fn packet_handler(&self) -> Option<Arc<dyn PacketHandler>>;

    fn is_closed(&self) -> bool;

    /// Close the session, optionally telling the peer why
    ///
    /// Graceful: queued packets are flushed first. Idempotent.
    fn disconnect(&self, reason: Option<&str>);

    /// Close without flushing queued packets. Idempotent.
    fn close_now(&self);
}

/// A bound client socket that can open one backend session
#[async_trait]
pub trait ClientTransport: Send + Sync {
    /// Local address reserved by the bind
    fn bind_address(&self) -> SocketAddr;

    /// Connect to a backend
    ///
    /// # Errors
    /// - [`tideway_core::ProxyError::ConnectTimeout`] if the backend does not answer in time
    /// - [`tideway_core::ProxyError::ConnectRefused`] if the connection attempt fails
    async fn connect(&self, address: SocketAddr, timeout: Duration) -> Result<Arc<dyn Session>>;

    /// Session opened by [`ClientTransport::connect`], if any
    fn session(&self) -> Option<Arc<dyn Session>>;

    /// Release the socket and close the session (graceful unless `force`)
    fn close(&self, force: bool);
}

/// Creates bound client transports
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Reserve local resources for one backend connection
    ///
    /// # Errors
    /// [`tideway_core::ProxyError::BindFailure`] if no local socket can be bound
    async fn bind_client(&self, protocol: ProtocolVersion) -> Result<Arc<dyn ClientTransport>>;
}
