//! Transfer types and the receiver-side state reducer

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::error::TransferError;

// ============================================================================
// Constants
// ============================================================================

/// Nominal slice size: 16KB
pub const CHUNK_SIZE: usize = 16 * 1024;

/// Sender pauses once this much is queued on the channel: 1MB
pub const BUFFERED_AMOUNT_HIGH: usize = 1024 * 1024;

/// Channel reports writable again at or below this: 256KB
pub const BUFFERED_AMOUNT_LOW: usize = 256 * 1024;

// ============================================================================
// Messages
// ============================================================================

/// Describes the file about to be sent. Produced once per attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMetadata {
    /// Original file name
    pub name: String,

    /// MIME type
    #[serde(rename = "type")]
    pub mime_type: String,

    /// Declared size in bytes
    pub size: u64,
}

impl TransferMetadata {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size,
        }
    }
}

/// The three messages of the transfer protocol, in send order:
/// one `Metadata`, zero or more `Chunk`s, one `End`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferMessage {
    Metadata(TransferMetadata),
    Chunk(Bytes),
    End,
}

impl TransferMessage {
    /// Message kind as it appears in the envelope
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Metadata(_) => "metadata",
            Self::Chunk(_) => "chunk",
            Self::End => "end",
        }
    }
}

// ============================================================================
// Receiver State
// ============================================================================

/// Receiver status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    /// No metadata received yet
    Idle,
    /// Accepting chunks
    Receiving,
    /// `end` received, artifact produced
    Complete,
    /// Attempt failed; see `TransferState::error`
    Error,
}

/// Declared vs. reconstructed size, recorded when they differ at `end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeMismatch {
    pub declared: u64,
    pub received: u64,
}

impl From<SizeMismatch> for TransferError {
    fn from(m: SizeMismatch) -> Self {
        TransferError::SizeMismatch {
            declared: m.declared,
            received: m.received,
        }
    }
}

/// Receiver-side transfer state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferState {
    /// Metadata of the current attempt
    pub metadata: Option<TransferMetadata>,

    /// Sum of all accepted chunk lengths
    pub received_bytes: u64,

    /// Number of accepted chunks
    pub chunk_count: u64,

    /// 0-100
    pub progress: u8,

    pub status: TransferStatus,

    /// Why the attempt failed, when `status == Error`
    pub error: Option<TransferError>,

    /// Set on completion when sizes disagree
    pub size_mismatch: Option<SizeMismatch>,
}

impl Default for TransferState {
    fn default() -> Self {
        Self {
            metadata: None,
            received_bytes: 0,
            chunk_count: 0,
            progress: 0,
            status: TransferStatus::Idle,
            error: None,
            size_mismatch: None,
        }
    }
}

impl TransferState {
    /// Apply one protocol message, producing the next state.
    ///
    /// This is the only place progress is derived.
    pub fn apply(&self, message: &TransferMessage) -> TransferState {
        match message {
            TransferMessage::Metadata(metadata) => TransferState {
                metadata: Some(metadata.clone()),
                status: TransferStatus::Receiving,
                ..TransferState::default()
            },

            TransferMessage::Chunk(bytes) => {
                if self.status != TransferStatus::Receiving {
                    return self.clone();
                }
                let received_bytes = self.received_bytes + bytes.len() as u64;
                TransferState {
                    received_bytes,
                    chunk_count: self.chunk_count + 1,
                    progress: progress_percent(received_bytes, self.declared_size()),
                    ..self.clone()
                }
            }

            TransferMessage::End => match (self.status, &self.metadata) {
                (TransferStatus::Receiving, Some(metadata)) => {
                    let size_mismatch = (self.received_bytes != metadata.size).then_some(SizeMismatch {
                        declared: metadata.size,
                        received: self.received_bytes,
                    });
                    TransferState {
                        progress: 100,
                        status: TransferStatus::Complete,
                        size_mismatch,
                        ..self.clone()
                    }
                }
                (TransferStatus::Complete, _) => self.clone(),
                (_, None) => self.fail(TransferError::MissingMetadata),
                (_, Some(_)) => self.clone(),
            },
        }
    }

    /// Transition to `Error`, keeping counters for diagnostics
    pub fn fail(&self, error: TransferError) -> TransferState {
        TransferState {
            status: TransferStatus::Error,
            error: Some(error),
            ..self.clone()
        }
    }

    /// Size declared by the current metadata (0 when none)
    pub fn declared_size(&self) -> u64 {
        self.metadata.as_ref().map(|m| m.size).unwrap_or(0)
    }

    /// Whether the attempt reached `Complete`
    pub fn is_complete(&self) -> bool {
        self.status == TransferStatus::Complete
    }
}

/// `min(100, round(received / declared * 100))`; 0 when nothing is declared
pub fn progress_percent(received: u64, declared: u64) -> u8 {
    if declared == 0 {
        return 0;
    }
    let scaled = (received as u128 * 200 + declared as u128) / (declared as u128 * 2);
    scaled.min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(data: &[u8]) -> TransferMessage {
        TransferMessage::Chunk(Bytes::copy_from_slice(data))
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(progress_percent(0, 100), 0);
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 67);
        assert_eq!(progress_percent(995, 1000), 100);
        assert_eq!(progress_percent(994, 1000), 99);
        assert_eq!(progress_percent(5000, 100), 100);
        assert_eq!(progress_percent(10, 0), 0);
    }

    #[test]
    fn test_hello_scenario() {
        let state = TransferState::default()
            .apply(&TransferMessage::Metadata(TransferMetadata::new("a.txt", "text/plain", 5)))
            .apply(&chunk(&[104, 101]));
        assert_eq!(state.progress, 40);

        let state = state.apply(&chunk(&[108, 108, 111])).apply(&TransferMessage::End);

        assert_eq!(state.status, TransferStatus::Complete);
        assert_eq!(state.received_bytes, 5);
        assert_eq!(state.chunk_count, 2);
        assert_eq!(state.progress, 100);
        assert_eq!(state.error, None);
        assert_eq!(state.size_mismatch, None);
    }

    #[test]
    fn test_byte_accounting_over_many_chunks() {
        let n = 7u64;
        let remainder = 123usize;
        let size = (n - 1) * CHUNK_SIZE as u64 + remainder as u64;

        let mut state = TransferState::default()
            .apply(&TransferMessage::Metadata(TransferMetadata::new("b.bin", "application/octet-stream", size)));
        for _ in 0..n - 1 {
            state = state.apply(&chunk(&[0u8; CHUNK_SIZE]));
            assert_eq!(state.status, TransferStatus::Receiving);
        }
        state = state.apply(&chunk(&vec![1u8; remainder]));

        assert_eq!(state.received_bytes, size);
        assert_eq!(state.progress, 100);

        let done = state.apply(&TransferMessage::End);
        assert_eq!(done.received_bytes, size);
        assert!(done.is_complete());
    }

    #[test]
    fn test_end_without_metadata() {
        let state = TransferState::default().apply(&TransferMessage::End);

        assert_eq!(state.status, TransferStatus::Error);
        assert_eq!(state.error, Some(TransferError::MissingMetadata));
    }

    #[test]
    fn test_new_metadata_resets() {
        let state = TransferState::default()
            .apply(&TransferMessage::Metadata(TransferMetadata::new("a", "text/plain", 10)))
            .apply(&chunk(&[1, 2, 3]))
            .apply(&TransferMessage::Metadata(TransferMetadata::new("b", "text/plain", 4)));

        assert_eq!(state.status, TransferStatus::Receiving);
        assert_eq!(state.received_bytes, 0);
        assert_eq!(state.chunk_count, 0);
        assert_eq!(state.metadata.unwrap().name, "b");
    }

    #[test]
    fn test_chunk_outside_receiving_is_ignored() {
        let idle = TransferState::default();
        assert_eq!(idle.apply(&chunk(&[1, 2])), idle);
    }

    #[test]
    fn test_size_mismatch_is_recorded() {
        let state = TransferState::default()
            .apply(&TransferMessage::Metadata(TransferMetadata::new("a", "text/plain", 10)))
            .apply(&chunk(&[1, 2, 3]))
            .apply(&TransferMessage::End);

        assert_eq!(state.status, TransferStatus::Complete);
        assert_eq!(
            state.size_mismatch,
            Some(SizeMismatch { declared: 10, received: 3 })
        );
    }

    #[test]
    fn test_duplicate_end_is_noop() {
        let done = TransferState::default()
            .apply(&TransferMessage::Metadata(TransferMetadata::new("a", "text/plain", 0)))
            .apply(&TransferMessage::End);

        assert_eq!(done.apply(&TransferMessage::End), done);
    }
}
