//! Transfer error types

use thiserror::Error;

/// Errors raised by either side of a transfer.
///
/// Local to the side that detects them; never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// Send attempted before the peer channel reported open
    #[error("Peer channel is not open")]
    ChannelNotReady,

    /// Channel closed while the transfer was in progress
    #[error("Peer channel closed")]
    ChannelClosed,

    /// Connectivity negotiation reported failure
    #[error("Peer connection failed")]
    ConnectivityFailed,

    /// Chunk payload is not a valid byte sequence
    #[error("Malformed chunk: {0}")]
    MalformedChunk(String),

    /// Message could not be decoded at all
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// `end` arrived without a prior `metadata`
    #[error("End of transfer received without metadata")]
    MissingMetadata,

    /// Reconstructed size differs from the declared size
    #[error("Size mismatch: declared {declared} bytes, received {received}")]
    SizeMismatch { declared: u64, received: u64 },

    /// Reading the source or writing the artifact failed
    #[error("IO error: {0}")]
    Io(String),

    /// The channel rejected an outgoing message
    #[error("Send failed: {0}")]
    SendFailed(String),
}

impl From<std::io::Error> for TransferError {
    fn from(err: std::io::Error) -> Self {
        TransferError::Io(err.to_string())
    }
}

/// Result type alias for transfer operations
pub type Result<T> = std::result::Result<T, TransferError>;
