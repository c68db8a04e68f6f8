//! In-memory transport
//!
//! Sessions that never touch a socket. Every write is recorded in call order
//! so tests can assert exactly what a peer would have received, and inbound
//! traffic is injected by hand. [`MemoryTransport`] keeps a registry of fake
//! backends and can simulate refused, unresponsive and unbindable endpoints.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tideway_core::{ProtocolVersion, ProxyError, Result};
use tideway_protocol::{build_disconnect, Packet};

use super::{BatchHandler, ClientTransport, Session, TransportFactory};
use crate::bridge::PacketHandler;

/// One recorded write
#[derive(Debug, Clone, PartialEq)]
pub enum SentFrame {
    /// `send_packet`
    Queued(Bytes),
    /// `send_packet_immediately`
    Immediate(Bytes),
    /// `send_batch`
    Batch(Vec<Bytes>),
}

impl SentFrame {
    fn frames(&self) -> Vec<Bytes> {
        match self {
            Self::Queued(frame) | Self::Immediate(frame) => vec![frame.clone()],
            Self::Batch(frames) => frames.clone(),
        }
    }
}

/// Recording session
pub struct MemorySession {
    address: SocketAddr,
    latency: Duration,
    sent: Mutex<Vec<SentFrame>>,
    batch_handler: RwLock<Option<Arc<dyn BatchHandler>>>,
    packet_handler: RwLock<Option<Arc<dyn PacketHandler>>>,
    closed: AtomicBool,
    closed_forcibly: AtomicBool,
    close_reason: Mutex<Option<String>>,
}

impl MemorySession {
    pub fn new(address: SocketAddr) -> Arc<Self> {
        Arc::new(Self {
            address,
            latency: Duration::from_millis(1),
            sent: Mutex::new(Vec::new()),
            batch_handler: RwLock::new(None),
            packet_handler: RwLock::new(None),
            closed: AtomicBool::new(false),
            closed_forcibly: AtomicBool::new(false),
            close_reason: Mutex::new(None),
        })
    }

    /// Deliver a batch as if the peer had sent it
    ///
    /// Dropped when the session is closed or has no batch handler yet.
    pub fn inject_batch(self: &Arc<Self>, packets: &[Packet]) {
        self.inject_frames(packets.iter().map(Packet::encode).collect());
    }

    /// Deliver raw frames as if the peer had sent them
    pub fn inject_frames(self: &Arc<Self>, frames: Vec<Bytes>) {
        if self.is_closed() {
            return;
        }
        if let Some(handler) = self.batch_handler() {
            handler.handle(&**self, frames);
        }
    }

    /// Simulate the peer closing the connection
    pub fn remote_close(self: &Arc<Self>, reason: &str) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        *self.close_reason.lock() = Some(reason.to_string());
        if let Some(handler) = self.batch_handler() {
            handler.on_disconnect(&**self, reason);
        }
        if let Some(handler) = self.packet_handler() {
            handler.on_disconnect(reason);
        }
    }

    /// Every write so far, in call order
    pub fn sent(&self) -> Vec<SentFrame> {
        self.sent.lock().clone()
    }

    /// Every written frame, flattened and decoded, in call order
    pub fn sent_packets(&self) -> Vec<Packet> {
        self.sent
            .lock()
            .iter()
            .flat_map(SentFrame::frames)
            .filter_map(|frame| Packet::decode(frame).ok())
            .collect()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }

    /// Whether the last close skipped the flush
    pub fn closed_forcibly(&self) -> bool {
        self.closed_forcibly.load(Ordering::Acquire)
    }

    pub fn close_reason(&self) -> Option<String> {
        self.close_reason.lock().clone()
    }

    fn record(&self, frame: SentFrame) {
        if !self.is_closed() {
            self.sent.lock().push(frame);
        }
    }
}

impl Session for MemorySession {
    fn address(&self) -> SocketAddr {
        self.address
    }

    fn latency(&self) -> Duration {
        self.latency
    }

    fn send_packet(&self, packet: &Packet) {
        self.record(SentFrame::Queued(packet.encode()));
    }

    fn send_packet_immediately(&self, packet: &Packet) {
        self.record(SentFrame::Immediate(packet.encode()));
    }

    fn send_batch(&self, frames: Vec<Bytes>) {
        self.record(SentFrame::Batch(frames));
    }

    fn set_batch_handler(&self, handler: Arc<dyn BatchHandler>) {
        *self.batch_handler.write() = Some(handler);
    }

    fn batch_handler(&self) -> Option<Arc<dyn BatchHandler>> {
        self.batch_handler.read().clone()
    }

    fn set_packet_handler(&self, handler: Arc<dyn PacketHandler>) {
        *self.packet_handler.write() = Some(handler);
    }

    fn packet_handler(&self) -> Option<Arc<dyn PacketHandler>> {
        self.packet_handler.read().clone()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn disconnect(&self, reason: Option<&str>) {
        if self.is_closed() {
            return;
        }
        if let Some(reason) = reason {
            self.record(SentFrame::Immediate(build_disconnect(reason).encode()));
            *self.close_reason.lock() = Some(reason.to_string());
        }
        self.closed.store(true, Ordering::Release);
    }

    fn close_now(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.closed_forcibly.store(true, Ordering::Release);
        }
    }
}

/// How a registered fake backend answers connection attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendBehavior {
    Accept,
    /// Never answers; connects run into their timeout
    Unresponsive,
}

#[derive(Default)]
struct Registry {
    backends: DashMap<SocketAddr, BackendBehavior>,
    sessions: DashMap<SocketAddr, Vec<Arc<MemorySession>>>,
    fail_bind: AtomicBool,
    next_port: AtomicU16,
}

/// Transport factory over in-memory sessions
#[derive(Clone, Default)]
pub struct MemoryTransport {
    registry: Arc<Registry>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept connections to `address`
    pub fn register_backend(&self, address: SocketAddr) {
        self.registry.backends.insert(address, BackendBehavior::Accept);
    }

    /// Swallow connections to `address` until they time out
    pub fn register_unresponsive(&self, address: SocketAddr) {
        self.registry.backends.insert(address, BackendBehavior::Unresponsive);
    }

    /// Make every subsequent bind fail
    pub fn set_fail_bind(&self, fail: bool) {
        self.registry.fail_bind.store(fail, Ordering::Release);
    }

    /// Most recent session opened to `address`
    pub fn last_session_to(&self, address: SocketAddr) -> Option<Arc<MemorySession>> {
        self.registry
            .sessions
            .get(&address)
            .and_then(|sessions| sessions.last().cloned())
    }

    /// Number of sessions ever opened to `address`
    pub fn session_count(&self, address: SocketAddr) -> usize {
        self.registry.sessions.get(&address).map_or(0, |sessions| sessions.len())
    }
}

#[async_trait]
impl TransportFactory for MemoryTransport {
    async fn bind_client(&self, _protocol: ProtocolVersion) -> Result<Arc<dyn ClientTransport>> {
        if self.registry.fail_bind.load(Ordering::Acquire) {
            return Err(ProxyError::BindFailure("simulated bind failure".into()));
        }
        let port = 40_000 + self.registry.next_port.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(MemoryClient {
            bind_address: SocketAddr::from(([127, 0, 0, 1], port)),
            registry: self.registry.clone(),
            session: Mutex::new(None),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Bound in-memory client
pub struct MemoryClient {
    bind_address: SocketAddr,
    registry: Arc<Registry>,
    session: Mutex<Option<Arc<MemorySession>>>,
    closed: AtomicBool,
}

#[async_trait]
impl ClientTransport for MemoryClient {
    fn bind_address(&self) -> SocketAddr {
        self.bind_address
    }

    async fn connect(&self, address: SocketAddr, timeout: Duration) -> Result<Arc<dyn Session>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ProxyError::InvalidState("client already closed".into()));
        }

        let behavior = self.registry.backends.get(&address).map(|entry| *entry);
        match behavior {
            None => Err(ProxyError::ConnectRefused {
                addr: address,
                reason: "no backend listening".into(),
            }),
            Some(BackendBehavior::Unresponsive) => {
                tokio::time::sleep(timeout).await;
                Err(ProxyError::ConnectTimeout(address))
            }
            Some(BackendBehavior::Accept) => {
                let session = MemorySession::new(address);
                self.registry
                    .sessions
                    .entry(address)
                    .or_default()
                    .push(session.clone());
                *self.session.lock() = Some(session.clone());
                Ok(session)
            }
        }
    }

    fn session(&self) -> Option<Arc<dyn Session>> {
        self.session
            .lock()
            .clone()
            .map(|session| session as Arc<dyn Session>)
    }

    fn close(&self, force: bool) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(session) = self.session.lock().as_ref() {
            if force {
                session.close_now();
            } else {
                session.disconnect(None);
            }
        }
    }
}
