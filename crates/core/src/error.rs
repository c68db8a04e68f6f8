//! Core error types for Tideway

use std::net::SocketAddr;

#[derive(thiserror::Error, Debug)]
pub enum ProxyError {
    #[error("Failed to bind downstream client: {0}")]
    BindFailure(String),

    #[error("Connection to {0} timed out")]
    ConnectTimeout(SocketAddr),

    #[error("Connection to {addr} refused: {reason}")]
    ConnectRefused { addr: SocketAddr, reason: String },

    #[error("Player {0} already has a transfer in progress")]
    TransferAlreadyInProgress(String),

    #[error("Session already closed")]
    SessionAlreadyClosed,

    #[error("Player {player} is already connected to {server}")]
    AlreadyConnected { player: String, server: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Transfer cancelled: {0}")]
    TransferCancelled(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl ProxyError {
    /// Connection-level failures that abort one transfer but leave the
    /// player attached to its current backend.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::BindFailure(_)
                | Self::ConnectTimeout(_)
                | Self::ConnectRefused { .. }
                | Self::TransferAlreadyInProgress(_)
                | Self::TransferCancelled(_)
                | Self::AlreadyConnected { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_failures_are_recoverable() {
        let addr: SocketAddr = "127.0.0.1:19132".parse().unwrap();
        assert!(ProxyError::ConnectTimeout(addr).is_recoverable());
        assert!(ProxyError::BindFailure("address in use".into()).is_recoverable());
        assert!(ProxyError::ConnectRefused { addr, reason: "refused".into() }.is_recoverable());
        assert!(!ProxyError::Protocol("bad packet".into()).is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = ProxyError::TransferAlreadyInProgress("Steve".into());
        assert_eq!(err.to_string(), "Player Steve already has a transfer in progress");
    }
}
