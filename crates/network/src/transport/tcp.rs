//! # TCP Transport
//!
//! Batches travel as length-delimited frames (`tokio-util`
//! [`LengthDelimitedCodec`]) whose payload is one encoded batch.
//!
//! # Architecture
//!
//! Each session runs three tasks:
//!
//! 1. **Reader** - decodes inbound batches and hands them to the batch handler
//! 2. **Writer** - drains the outbound channel into the socket, in order
//! 3. **Flusher** - periodically turns queued packets into one batch
//!
//! Every write into the outbound channel happens under the pending-queue
//! lock, so queued packets, immediate packets and forwarded batches leave in
//! exactly the order they were issued.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tideway_core::{ProtocolVersion, ProxyError, Result};
use tideway_protocol::{build_disconnect, decode_batch, encode_batch, CompressionType, Packet};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use super::{BatchHandler, ClientTransport, Session, TransportFactory};
use crate::bridge::PacketHandler;

/// Per-session transport settings
#[derive(Debug, Clone, Copy)]
pub struct TcpSessionConfig {
    /// How often queued packets are flushed
    pub flush_interval: Duration,
    /// Compression applied to every batch
    pub compression: CompressionType,
    /// Largest accepted frame on the wire
    pub max_frame_length: usize,
}

impl Default for TcpSessionConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_millis(50),
            compression: CompressionType::Zlib,
            max_frame_length: 8 * 1024 * 1024,
        }
    }
}

impl TcpSessionConfig {
    fn codec(&self) -> LengthDelimitedCodec {
        LengthDelimitedCodec::builder()
            .max_frame_length(self.max_frame_length)
            .new_codec()
    }
}

enum Outbound {
    Batch(Bytes),
    Shutdown,
}

/// A live TCP session
pub struct TcpSession {
    address: SocketAddr,
    latency: Duration,
    config: TcpSessionConfig,

    /// Packets waiting for the next flush
    pending: Mutex<Vec<Bytes>>,

    /// Encoded batches for the writer task
    outbound: mpsc::UnboundedSender<Outbound>,

    batch_handler: RwLock<Option<Arc<dyn BatchHandler>>>,
    packet_handler: RwLock<Option<Arc<dyn PacketHandler>>>,
    handler_ready: Notify,

    closed: AtomicBool,

    /// Reader, writer and flusher
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TcpSession {
    /// Wrap a connected stream and start its tasks
    pub fn spawn(stream: TcpStream, latency: Duration, config: TcpSessionConfig) -> Result<Arc<Self>> {
        stream.set_nodelay(true)?;
        let address = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();

        let session = Arc::new(Self {
            address,
            latency,
            config,
            pending: Mutex::new(Vec::new()),
            outbound: tx,
            batch_handler: RwLock::new(None),
            packet_handler: RwLock::new(None),
            handler_ready: Notify::new(),
            closed: AtomicBool::new(false),
            tasks: Mutex::new(Vec::with_capacity(3)),
        });

        let writer = tokio::spawn(write_loop(FramedWrite::new(write_half, config.codec()), rx));
        let reader = tokio::spawn(read_loop(
            Arc::downgrade(&session),
            FramedRead::new(read_half, config.codec()),
            config.compression,
        ));
        let flusher = tokio::spawn(flush_loop(Arc::downgrade(&session), config.flush_interval));
        session.tasks.lock().extend([writer, reader, flusher]);

        tracing::debug!("TCP session {} started", address);
        Ok(session)
    }

    /// Write out queued packets as one batch
    pub fn flush(&self) {
        let mut pending = self.pending.lock();
        self.flush_locked(&mut pending);
    }

    fn flush_locked(&self, pending: &mut Vec<Bytes>) {
        if pending.is_empty() {
            return;
        }
        let frames = std::mem::take(pending);
        self.write_locked(&frames);
    }

    // Caller holds the pending lock
    fn write_locked(&self, frames: &[Bytes]) {
        match encode_batch(frames, self.config.compression) {
            Ok(payload) => {
                // Receiver gone means the writer already stopped
                let _ = self.outbound.send(Outbound::Batch(payload));
            }
            Err(e) => tracing::warn!("Dropping batch to {}: {}", self.address, e),
        }
    }

    async fn wait_for_handler(&self) -> Arc<dyn BatchHandler> {
        loop {
            if let Some(handler) = self.batch_handler() {
                return handler;
            }
            self.handler_ready.notified().await;
        }
    }

    fn on_remote_close(&self, reason: &str) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!("TCP session {} closed by peer: {}", self.address, reason);
        let _ = self.outbound.send(Outbound::Shutdown);

        if let Some(handler) = self.batch_handler() {
            handler.on_disconnect(self, reason);
        }
        if let Some(handler) = self.packet_handler() {
            handler.on_disconnect(reason);
        }
    }
}

impl Session for TcpSession {
    fn address(&self) -> SocketAddr {
        self.address
    }

    fn latency(&self) -> Duration {
        self.latency
    }

    fn send_packet(&self, packet: &Packet) {
        if self.is_closed() {
            return;
        }
        self.pending.lock().push(packet.encode());
    }

    fn send_packet_immediately(&self, packet: &Packet) {
        if self.is_closed() {
            return;
        }
        let mut pending = self.pending.lock();
        self.flush_locked(&mut pending);
        self.write_locked(&[packet.encode()]);
    }

    fn send_batch(&self, frames: Vec<Bytes>) {
        if self.is_closed() || frames.is_empty() {
            return;
        }
        let mut pending = self.pending.lock();
        self.flush_locked(&mut pending);
        self.write_locked(&frames);
    }

    fn set_batch_handler(&self, handler: Arc<dyn BatchHandler>) {
        *self.batch_handler.write() = Some(handler);
        self.handler_ready.notify_one();
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
        let mut pending = self.pending.lock();
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(reason) = reason {
            pending.push(build_disconnect(reason).encode());
        }
        self.flush_locked(&mut pending);
        let _ = self.outbound.send(Outbound::Shutdown);
        drop(pending);

        tracing::debug!("TCP session {} closing", self.address);
    }

    fn close_now(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.pending.lock().clear();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        tracing::debug!("TCP session {} closed forcibly", self.address);
    }
}

async fn write_loop(
    mut sink: FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            Outbound::Batch(payload) => {
                if let Err(e) = sink.send(payload).await {
                    tracing::debug!("Write failed: {}", e);
                    break;
                }
            }
            Outbound::Shutdown => break,
        }
    }
    let _ = SinkExt::<Bytes>::close(&mut sink).await;
}

async fn read_loop(
    session: Weak<TcpSession>,
    mut frames: FramedRead<OwnedReadHalf, LengthDelimitedCodec>,
    compression: CompressionType,
) {
    let reason = loop {
        let next = frames.next().await;
        let Some(session) = session.upgrade() else {
            return;
        };
        if session.is_closed() {
            return;
        }

        match next {
            None => break "connection closed by peer".to_string(),
            Some(Err(e)) => break format!("read error: {}", e),
            Some(Ok(payload)) => {
                let batch = match decode_batch(payload.freeze(), compression) {
                    Ok(batch) => batch,
                    Err(e) => {
                        tracing::warn!("Dropping undecodable batch from {}: {}", session.address, e);
                        continue;
                    }
                };
                let handler = session.wait_for_handler().await;
                handler.handle(&*session, batch);
            }
        }
    };

    if let Some(session) = session.upgrade() {
        session.on_remote_close(&reason);
    }
}

async fn flush_loop(session: Weak<TcpSession>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let Some(session) = session.upgrade() else {
            break;
        };
        if session.is_closed() {
            break;
        }
        session.flush();
    }
}

/// Bind a client-facing listener with address reuse enabled
pub fn bind_listener(address: SocketAddr) -> Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(address), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&address.into())?;
    socket.listen(1024)?;
    let listener: std::net::TcpListener = socket.into();
    Ok(TcpListener::from_std(listener)?)
}

/// Transport factory producing TCP clients
#[derive(Debug, Clone, Default)]
pub struct TcpTransport {
    config: TcpSessionConfig,
}

impl TcpTransport {
    pub fn new(config: TcpSessionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> TcpSessionConfig {
        self.config
    }
}

fn bind_socket(ipv6: bool) -> Result<(TcpSocket, SocketAddr)> {
    let bind_failure = |e: std::io::Error| ProxyError::BindFailure(e.to_string());
    let (socket, wildcard) = if ipv6 {
        (TcpSocket::new_v6().map_err(bind_failure)?, SocketAddr::from(([0u16; 8], 0)))
    } else {
        (TcpSocket::new_v4().map_err(bind_failure)?, SocketAddr::from(([0, 0, 0, 0], 0)))
    };
    socket.bind(wildcard).map_err(bind_failure)?;
    let local = socket.local_addr().map_err(bind_failure)?;
    Ok((socket, local))
}

#[async_trait]
impl TransportFactory for TcpTransport {
    async fn bind_client(&self, _protocol: ProtocolVersion) -> Result<Arc<dyn ClientTransport>> {
        let (socket, bind_address) = bind_socket(false)?;
        tracing::debug!("Bound downstream client on {}", bind_address);
        Ok(Arc::new(TcpClient {
            socket: Mutex::new(Some(socket)),
            bind_address: Mutex::new(bind_address),
            session: Mutex::new(None),
            config: self.config,
        }))
    }
}

/// Bound TCP client socket
pub struct TcpClient {
    socket: Mutex<Option<TcpSocket>>,
    bind_address: Mutex<SocketAddr>,
    session: Mutex<Option<Arc<TcpSession>>>,
    config: TcpSessionConfig,
}

#[async_trait]
impl ClientTransport for TcpClient {
    fn bind_address(&self) -> SocketAddr {
        *self.bind_address.lock()
    }

    async fn connect(&self, address: SocketAddr, timeout: Duration) -> Result<Arc<dyn Session>> {
        let socket = self
            .socket
            .lock()
            .take()
            .ok_or_else(|| ProxyError::InvalidState("client socket already used".into()))?;

        // Rebind when the backend's address family differs from the bound socket
        let socket = if address.is_ipv6() != self.bind_address().is_ipv6() {
            let (socket, local) = bind_socket(address.is_ipv6())?;
            *self.bind_address.lock() = local;
            socket
        } else {
            socket
        };

        let started = Instant::now();
        let stream = match tokio::time::timeout(timeout, socket.connect(address)).await {
            Err(_) => return Err(ProxyError::ConnectTimeout(address)),
            Ok(Err(e)) => {
                return Err(ProxyError::ConnectRefused {
                    addr: address,
                    reason: e.to_string(),
                })
            }
            Ok(Ok(stream)) => stream,
        };

        let session = TcpSession::spawn(stream, started.elapsed(), self.config)?;
        *self.session.lock() = Some(session.clone());
        Ok(session)
    }

    fn session(&self) -> Option<Arc<dyn Session>> {
        self.session
            .lock()
            .clone()
            .map(|session| session as Arc<dyn Session>)
    }

    fn close(&self, force: bool) {
        self.socket.lock().take();
        if let Some(session) = self.session.lock().as_ref() {
            if force {
                session.close_now();
            } else {
                session.disconnect(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Forward(mpsc::UnboundedSender<Vec<Bytes>>);

    impl BatchHandler for Forward {
        fn handle(&self, _source: &dyn Session, batch: Vec<Bytes>) {
            let _ = self.0.send(batch);
        }
    }

    async fn connected_pair(config: TcpSessionConfig) -> (Arc<dyn Session>, Arc<TcpSession>) {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();

        let transport = TcpTransport::new(config);
        let client = transport.bind_client(ProtocolVersion::DEFAULT).await.unwrap();
        let (connected, accepted) = tokio::join!(client.connect(addr, Duration::from_secs(5)), listener.accept());
        let (stream, _) = accepted.unwrap();
        let server_side = TcpSession::spawn(stream, Duration::ZERO, config).unwrap();
        (connected.unwrap(), server_side)
    }

    #[tokio::test]
    async fn test_queued_packets_leave_before_later_batch() {
        let config = TcpSessionConfig {
            flush_interval: Duration::from_secs(3600),
            ..Default::default()
        };
        let (client, server) = connected_pair(config).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        server.set_batch_handler(Arc::new(Forward(tx)));

        client.send_packet(&Packet::PlayStatus { status: 0 });
        client.send_batch(vec![Packet::RequestChunkRadius { radius: 6 }.encode()]);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(Packet::decode(first[0].clone()).unwrap(), Packet::PlayStatus { status: 0 });
        assert_eq!(Packet::decode(second[0].clone()).unwrap(), Packet::RequestChunkRadius { radius: 6 });
    }

    #[tokio::test]
    async fn test_periodic_flush() {
        let config = TcpSessionConfig {
            flush_interval: Duration::from_millis(10),
            compression: CompressionType::None,
            ..Default::default()
        };
        let (client, server) = connected_pair(config).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        server.set_batch_handler(Arc::new(Forward(tx)));

        client.send_packet(&Packet::PlayStatus { status: 3 });
        client.send_packet(&Packet::ChunkRadiusUpdated { radius: 8 });

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[tokio::test]
    async fn test_sends_after_close_are_dropped() {
        let (client, _server) = connected_pair(TcpSessionConfig::default()).await;
        client.disconnect(None);
        assert!(client.is_closed());
        client.send_packet(&Packet::PlayStatus { status: 3 });
        client.close_now();
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = TcpTransport::default().bind_client(ProtocolVersion::DEFAULT).await.unwrap();
        let err = client.connect(addr, Duration::from_secs(5)).await.err().unwrap();
        assert!(matches!(err, ProxyError::ConnectRefused { .. }));
    }
}
