//! # Tideway Networking Layer
//!
//! Everything between the client socket and the backend sockets.
//!
//! ## Modules
//!
//! - [`transport`] - Batch-oriented sessions (TCP and in-memory)
//! - [`downstream`] - Backend connection lifecycle
//! - [`bridge`] - Relays batches between client and backend
//! - [`rewrite`] - Entity/item id translation and world-state injection
//! - [`handlers`] - Packet hooks on backend sessions
//! - [`transfer`] - Backend switch state machine
//! - [`player`] - Per-client state and the active link
//! - [`server_info`] - Backend registry
//! - [`manager`] - Connected players
//! - [`events`] - Proxy event fan-out
//! - [`config`] - Runtime configuration
//! - [`server`] - Listener and login handling

pub mod bridge;
pub mod config;
pub mod connection;
pub mod downstream;
pub mod events;
pub mod handlers;
pub mod manager;
pub mod player;
pub mod rewrite;
pub mod server;
pub mod server_info;
pub mod transfer;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used items
pub use bridge::{CancelSignal, PacketHandler};
pub use config::NetworkConfig;
pub use connection::ServerConnection;
pub use downstream::{ConnectionState, DownstreamConnection, DownstreamSession};
pub use events::{EventListener, EventManager, ProxyEvent};
pub use manager::PlayerManager;
pub use player::ProxiedPlayer;
pub use rewrite::RewriteData;
pub use server::{ProxyContext, ProxyServer};
pub use server_info::{ServerInfo, ServerInfoMap};
pub use transfer::{TransferCallback, TransferPhase};
pub use transport::tcp::TcpTransport;
pub use transport::{BatchHandler, Session, TransportFactory};
