//! Errors surfaced by session, transfer, command and exploit operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum IrecvError {
    #[error("No device found in Recovery, WTF or DFU mode")]
    NoDeviceFound,

    #[error("Connection to the device lost")]
    ConnectionLost,

    #[error("Transfer size mismatch: expected {expected} bytes, transferred {actual}")]
    TransferSizeMismatch { expected: usize, actual: usize },

    #[error("Failed to initialize transfer: {0}")]
    TransferStartFailed(String),

    #[error("Status read failed: expected 6 bytes, got {actual}")]
    StatusReadFailure { actual: usize },

    #[error("Invalid status: expected {expected}, got {actual}")]
    StatusValueMismatch { expected: u8, actual: u8 },

    #[error("Command too long: {length} bytes with terminator, limit is {limit}")]
    CommandTooLong { length: usize, limit: usize },

    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Unable to allocate {size} bytes for payload")]
    AllocationFailure { size: u64 },

    #[error("Console interface setup failed: {0}")]
    ConfigurationClaimFailure(TransportError),

    #[error("Exploit trigger failed: {0}")]
    ExploitSendFailed(TransportError),

    #[error("Invalid request code: {0:?}")]
    InvalidRequest(String),

    #[error("Transport error: {0}")]
    Transport(TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TransportError> for IrecvError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Disconnected => IrecvError::ConnectionLost,
            other => IrecvError::Transport(other),
        }
    }
}

pub type Result<T, E = IrecvError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_maps_to_connection_lost() {
        let err: IrecvError = TransportError::Disconnected.into();
        assert!(matches!(err, IrecvError::ConnectionLost));

        let err: IrecvError = TransportError::Timeout { timeout_ms: 10 }.into();
        assert!(matches!(err, IrecvError::Transport(_)));
    }
}
