//! Error types for the data channel.

use rhfs_protocol::WireError;

/// Errors produced while connecting to or serving the data service.
#[derive(Debug, thiserror::Error)]
pub enum DataChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection timed out")]
    Timeout,

    #[error("wire error: {0}")]
    Wire(#[from] WireError),
}
