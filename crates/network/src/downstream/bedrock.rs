//! Default downstream implementation over the proxy's transport

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tideway_core::{ProtocolVersion, ProxyError, Result};
use tideway_protocol::Packet;

use super::{ConnectionState, DownstreamConnection, DownstreamSession};
use crate::bridge::{BridgeRole, DownstreamBridge, TransferBatchBridge, UpstreamBridge};
use crate::connection::ServerConnection;
use crate::handlers::{ConnectedDownstreamHandler, InitialHandler, SwitchDownstreamHandler};
use crate::player::ProxiedPlayer;
use crate::server_info::ServerInfo;
use crate::transport::{ClientTransport, Session, TransportFactory};

pub struct BedrockDownstream {
    server_info: Arc<ServerInfo>,
    transport: Arc<dyn TransportFactory>,
    client: Mutex<Option<Arc<dyn ClientTransport>>>,
    session: Mutex<Option<Arc<BedrockDownstreamSession>>>,
    state: Mutex<ConnectionState>,
}

impl BedrockDownstream {
    pub fn new(server_info: Arc<ServerInfo>, transport: Arc<dyn TransportFactory>) -> Self {
        Self {
            server_info,
            transport,
            client: Mutex::new(None),
            session: Mutex::new(None),
            state: Mutex::new(ConnectionState::Unbound),
        }
    }

    /// Connector registered for the `bedrock` type tag
    pub fn connector(server_info: Arc<ServerInfo>, transport: Arc<dyn TransportFactory>) -> Arc<dyn DownstreamConnection> {
        Arc::new(Self::new(server_info, transport))
    }

    fn transition(&self, from: ConnectionState, to: ConnectionState) -> Result<()> {
        let mut state = self.state.lock();
        if *state != from {
            return Err(ProxyError::InvalidState(format!(
                "downstream to {} is {:?}, expected {:?}",
                self.server_info.name(),
                *state,
                from
            )));
        }
        *state = to;
        Ok(())
    }
}

#[async_trait]
impl DownstreamConnection for BedrockDownstream {
    async fn bind(&self, protocol: ProtocolVersion) -> Result<()> {
        self.transition(ConnectionState::Unbound, ConnectionState::Unbound)?;

        let client = match self.transport.bind_client(protocol).await {
            Ok(client) => client,
            Err(e) => {
                *self.state.lock() = ConnectionState::Closed;
                return Err(e);
            }
        };

        if self.transition(ConnectionState::Unbound, ConnectionState::Bound).is_err() {
            // Closed while binding
            client.close(true);
            return Err(ProxyError::InvalidState("downstream closed while binding".into()));
        }
        *self.client.lock() = Some(client);
        Ok(())
    }

    async fn connect(&self, address: SocketAddr, timeout: Duration) -> Result<Arc<dyn DownstreamSession>> {
        self.transition(ConnectionState::Bound, ConnectionState::Connecting)?;
        let client = self
            .client
            .lock()
            .clone()
            .ok_or_else(|| ProxyError::InvalidState("downstream was not bound".into()))?;

        tracing::debug!("Connecting to {} ({}) from {}", self.server_info.name(), address, client.bind_address());
        let session = match client.connect(address, timeout).await {
            Ok(session) => session,
            Err(e) => {
                client.close(true);
                *self.state.lock() = ConnectionState::Closed;
                return Err(e);
            }
        };

        if self.transition(ConnectionState::Connecting, ConnectionState::Connected).is_err() {
            session.close_now();
            return Err(ProxyError::InvalidState("downstream closed while connecting".into()));
        }

        let downstream = Arc::new(BedrockDownstreamSession::new(session));
        *self.session.lock() = Some(downstream.clone());
        Ok(downstream)
    }

    fn on_downstream_connected(self: Arc<Self>, player: &Arc<ProxiedPlayer>) {
        let Some(session) = self.session.lock().clone() else {
            tracing::warn!("on_downstream_connected without a session to {}", self.server_info.name());
            return;
        };
        let downstream = session.session().clone();

        if player.server().is_none() {
            let server = Arc::new(ServerConnection::new(
                self.server_info.clone(),
                self.clone(),
                session.clone(),
            ));
            player.on_initial_server_connected(server.clone());

            downstream.set_packet_handler(Arc::new(InitialHandler::new(player)));
            downstream.set_batch_handler(Arc::new(DownstreamBridge::new(player, &server)));
            player.upstream().set_batch_handler(Arc::new(UpstreamBridge::new(player)));
        } else {
            let Some(callback) = player.pending_transfer() else {
                tracing::warn!("{} connected to {} without a pending transfer", player.name(), self.server_info.name());
                self.close(true);
                return;
            };
            let bridge = Arc::new(TransferBatchBridge::new(player, BridgeRole::New));
            callback.set_new_bridge(bridge.clone());
            downstream.set_packet_handler(Arc::new(SwitchDownstreamHandler::new(player, callback)));
            downstream.set_batch_handler(bridge);
        }

        downstream.send_packet_immediately(player.login_packet());
        tracing::info!(
            "[{}|{}] -> Downstream [{}] has connected",
            player.upstream().address(),
            player.name(),
            self.server_info.name()
        );
    }

    fn send_packet(&self, packet: &Packet) {
        if let Some(session) = self.session.lock().as_ref() {
            session.send_packet(packet);
        }
    }

    fn send_packet_immediately(&self, packet: &Packet) {
        if let Some(session) = self.session.lock().as_ref() {
            session.send_packet_immediately(packet);
        }
    }

    fn bind_address(&self) -> Option<SocketAddr> {
        self.client.lock().as_ref().map(|client| client.bind_address())
    }

    fn close(&self, force: bool) {
        {
            let mut state = self.state.lock();
            if *state == ConnectionState::Closed {
                return;
            }
            *state = ConnectionState::Closed;
        }
        if let Some(client) = self.client.lock().take() {
            client.close(force);
        }
    }

    fn server_info(&self) -> &Arc<ServerInfo> {
        &self.server_info
    }

    fn session(&self) -> Option<Arc<dyn DownstreamSession>> {
        self.session
            .lock()
            .clone()
            .map(|session| session as Arc<dyn DownstreamSession>)
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }
}

pub struct BedrockDownstreamSession {
    session: Arc<dyn Session>,
    blocking_id: Mutex<Option<i32>>,
}

impl BedrockDownstreamSession {
    pub fn new(session: Arc<dyn Session>) -> Self {
        Self {
            session,
            blocking_id: Mutex::new(None),
        }
    }
}

impl DownstreamSession for BedrockDownstreamSession {
    fn on_downstream_initialize(&self, player: &Arc<ProxiedPlayer>, server: &Arc<ServerConnection>) {
        self.set_hardcoded_blocking_id(player.rewrite().shield_blocking_id);
        self.session
            .set_packet_handler(Arc::new(ConnectedDownstreamHandler::new(player, server)));
    }

    fn on_transfer_completed(&self, player: &Arc<ProxiedPlayer>, server: &Arc<ServerConnection>) {
        player.upstream().set_batch_handler(Arc::new(UpstreamBridge::new(player)));
        self.session
            .set_batch_handler(Arc::new(DownstreamBridge::new(player, server)));
    }

    fn address(&self) -> SocketAddr {
        self.session.address()
    }

    fn latency(&self) -> Duration {
        self.session.latency()
    }

    fn send_packet(&self, packet: &Packet) {
        self.session.send_packet(packet);
    }

    fn send_packet_immediately(&self, packet: &Packet) {
        self.session.send_packet_immediately(packet);
    }

    fn send_batch(&self, frames: Vec<Bytes>) {
        self.session.send_batch(frames);
    }

    fn set_hardcoded_blocking_id(&self, runtime_id: Option<i32>) {
        *self.blocking_id.lock() = runtime_id;
    }

    fn hardcoded_blocking_id(&self) -> Option<i32> {
        *self.blocking_id.lock()
    }

    fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    fn disconnect(&self) {
        self.session.disconnect(None);
    }

    fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    fn is_bedrock(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryTransport;

    fn server(transport: &MemoryTransport, port: u16) -> Arc<ServerInfo> {
        let address = SocketAddr::from(([127, 0, 0, 1], port));
        transport.register_backend(address);
        ServerInfo::new("lobby", address, address, "bedrock", BedrockDownstream::connector)
    }

    #[tokio::test]
    async fn test_state_machine() {
        let transport = MemoryTransport::new();
        let info = server(&transport, 19133);
        let connection = info.bind_new_connection(Arc::new(transport.clone()));
        assert_eq!(connection.state(), ConnectionState::Unbound);
        assert!(connection.bind_address().is_none());

        connection.bind(ProtocolVersion::DEFAULT).await.unwrap();
        assert_eq!(connection.state(), ConnectionState::Bound);
        assert!(connection.bind_address().is_some());

        let session = connection.connect(info.address(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(connection.state(), ConnectionState::Connected);
        assert!(!session.is_closed());

        connection.close(false);
        connection.close(true);
        assert_eq!(connection.state(), ConnectionState::Closed);
        assert!(session.is_closed());
        assert!(!transport.last_session_to(info.address()).unwrap().closed_forcibly());

        // Closed is terminal; sends are dropped
        connection.send_packet(&Packet::PlayStatus { status: 3 });
        assert!(transport.last_session_to(info.address()).unwrap().sent().is_empty());
    }

    #[tokio::test]
    async fn test_connect_requires_bind() {
        let transport = MemoryTransport::new();
        let info = server(&transport, 19133);
        let connection = info.bind_new_connection(Arc::new(transport));
        let err = connection.connect(info.address(), Duration::from_secs(1)).await.err().unwrap();
        assert!(matches!(err, ProxyError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_refused_connect_closes() {
        let transport = MemoryTransport::new();
        let address = SocketAddr::from(([127, 0, 0, 1], 19999));
        let info = ServerInfo::new("void", address, address, "bedrock", BedrockDownstream::connector);
        let connection = info.bind_new_connection(Arc::new(transport));

        connection.bind(ProtocolVersion::DEFAULT).await.unwrap();
        let err = connection.connect(address, Duration::from_secs(1)).await.err().unwrap();
        assert!(matches!(err, ProxyError::ConnectRefused { .. }));
        assert_eq!(connection.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_unresponsive_backend_times_out() {
        let transport = MemoryTransport::new();
        let address = SocketAddr::from(([127, 0, 0, 1], 19998));
        transport.register_unresponsive(address);
        let info = ServerInfo::new("slow", address, address, "bedrock", BedrockDownstream::connector);
        let connection = info.bind_new_connection(Arc::new(transport));

        connection.bind(ProtocolVersion::DEFAULT).await.unwrap();
        let err = connection.connect(address, Duration::from_millis(20)).await.err().unwrap();
        assert!(matches!(err, ProxyError::ConnectTimeout(_)));
        assert_eq!(connection.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let transport = MemoryTransport::new();
        transport.set_fail_bind(true);
        let info = server(&transport, 19133);
        let connection = info.bind_new_connection(Arc::new(transport));
        let err = connection.bind(ProtocolVersion::DEFAULT).await.err().unwrap();
        assert!(matches!(err, ProxyError::BindFailure(_)));
        assert_eq!(connection.state(), ConnectionState::Closed);
    }
}
