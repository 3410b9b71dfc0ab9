//! Peer-to-peer file transfer
//!
//! Once signaling has produced a direct, ordered, reliable channel between
//! the two clients, the sender pushes one file as:
//!
//! 1. `metadata` (name, MIME type, declared size)
//! 2. zero or more `chunk`s, each the next contiguous slice of the source
//! 3. `end`
//!
//! There is no sequence numbering or acknowledgement; ordering comes from
//! the channel and flow control from its buffered-amount signal.
//!
//! # Components
//!
//! - [`SenderChunker`]: slices a source and sends it with backpressure
//! - [`ReceiverAssembler`]: rebuilds the file, driving previews and progress
//! - [`TransferState::apply`]: the reducer every receiver state change goes through
//! - [`PeerChannel`]: the channel contract, with an in-memory implementation

pub mod artifact;
pub mod assembler;
pub mod channel;
pub mod chunker;
pub mod error;
pub mod preview;
pub mod protocol;
pub mod types;
pub mod view;

pub use artifact::{Artifact, PreviewArtifact};
pub use assembler::{receive_until_end, ReceiverAssembler};
pub use channel::{
    memory_channel, memory_channel_with, ChannelState, MemoryChannel, MemoryChannelReceiver,
    PeerChannel, PeerChannelReceiver,
};
pub use chunker::{open_source, ChunkerOptions, SendProgress, SendStatus, SenderChunker};
pub use error::{Result, TransferError};
pub use preview::{MediaCategory, PreviewPolicy};
pub use protocol::{decode, encode, ChannelMessage, ChunkFraming};
pub use types::*;
pub use view::{ConnectionStatus, TransferView};
