//! Receiver-side reassembly
//!
//! Wraps the pure `TransferState` reducer with slice storage, progressive
//! previews and the final artifact.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use super::artifact::{Artifact, PreviewArtifact};
use super::channel::{ChannelState, PeerChannelReceiver};
use super::error::{Result, TransferError};
use super::preview::{PreviewPolicy, PreviewTracker};
use super::protocol::{decode, ChannelMessage};
use super::types::{TransferMessage, TransferState, TransferStatus};
use super::view::TransferView;

/// Reassembles one transfer attempt at a time
#[derive(Debug, Default)]
pub struct ReceiverAssembler {
    state: TransferState,
    chunks: Vec<Bytes>,
    preview: PreviewTracker,
    artifact: Option<Arc<Artifact>>,
}

impl ReceiverAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &TransferState {
        &self.state
    }

    pub fn status(&self) -> TransferStatus {
        self.state.status
    }

    pub fn progress(&self) -> u8 {
        self.state.progress
    }

    /// Whether the current attempt produces progressive previews
    pub fn is_streaming(&self) -> bool {
        self.state.status == TransferStatus::Receiving && self.preview.policy().is_enabled()
    }

    /// Latest partial artifact, released once superseded or completed
    pub fn preview(&self) -> Option<&Arc<PreviewArtifact>> {
        self.preview.current()
    }

    /// Previews built during the current attempt
    pub fn previews_materialized(&self) -> u64 {
        self.preview.generation()
    }

    pub fn artifact(&self) -> Option<&Arc<Artifact>> {
        self.artifact.as_ref()
    }

    /// Decode and apply one raw channel message.
    ///
    /// Malformed chunks fail the attempt; undecodable messages are skipped.
    pub fn handle_message(&mut self, message: ChannelMessage) -> &TransferState {
        match decode(message) {
            Ok(message) => self.apply(message),
            Err(err @ TransferError::MalformedChunk(_)) => {
                tracing::warn!(error = %err, "Rejecting malformed chunk");
                self.fail(err)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Ignoring undecodable transfer message");
                &self.state
            }
        }
    }

    /// Apply one decoded protocol message
    pub fn apply(&mut self, message: TransferMessage) -> &TransferState {
        let next = self.state.apply(&message);

        match message {
            TransferMessage::Metadata(metadata) => {
                if self.state.status == TransferStatus::Receiving {
                    tracing::info!(
                        previous = ?self.state.metadata.as_ref().map(|m| &m.name),
                        received_bytes = self.state.received_bytes,
                        "New metadata cancels the transfer in progress"
                    );
                }
                self.chunks.clear();
                self.artifact = None;
                self.preview.release();
                self.preview = PreviewTracker::new(PreviewPolicy::for_metadata(&metadata));

                tracing::info!(
                    name = %metadata.name,
                    mime_type = %metadata.mime_type,
                    size = metadata.size,
                    streaming = self.preview.policy().is_enabled(),
                    "Receiving file"
                );
            }

            TransferMessage::Chunk(bytes) => {
                if next.status != TransferStatus::Receiving {
                    tracing::warn!(
                        status = ?self.state.status,
                        len = bytes.len(),
                        "Ignoring chunk outside of a transfer"
                    );
                } else {
                    self.chunks.push(bytes);
                    tracing::debug!(
                        received_bytes = next.received_bytes,
                        progress = next.progress,
                        "Received chunk"
                    );
                    if self.preview.is_due(next.received_bytes) {
                        self.materialize_preview(&next);
                    }
                }
            }

            TransferMessage::End => {
                if next.is_complete() && self.artifact.is_none() {
                    self.finish(&next);
                } else if next.status == TransferStatus::Error {
                    tracing::warn!(error = ?next.error, "Transfer ended in error");
                } else if next.is_complete() {
                    tracing::debug!("Ignoring duplicate end");
                }
            }
        }

        self.state = next;
        &self.state
    }

    /// Abort the current attempt
    pub fn fail(&mut self, error: TransferError) -> &TransferState {
        self.state = self.state.fail(error);
        self.chunks.clear();
        self.preview.release();
        &self.state
    }

    /// Snapshot for presentation
    pub fn view(&self, channel_state: ChannelState) -> TransferView {
        TransferView {
            connection_status: channel_state.into(),
            transfer_progress: self.state.progress,
            is_streaming: self.is_streaming(),
            received_bytes: self.state.received_bytes,
            artifact: self.artifact.clone(),
        }
    }

    fn materialize_preview(&mut self, next: &TransferState) {
        let Some(metadata) = next.metadata.as_ref() else {
            return;
        };
        let preview = self.preview.store(&metadata.mime_type, self.concat());
        tracing::debug!(
            generation = preview.generation,
            bytes = preview.data.len(),
            "Materialized preview"
        );
    }

    fn finish(&mut self, next: &TransferState) {
        let Some(metadata) = next.metadata.as_ref() else {
            return;
        };

        let artifact = Artifact::new(metadata, self.concat());
        self.chunks.clear();
        self.preview.release();

        if let Some(mismatch) = artifact.size_mismatch {
            tracing::warn!(
                name = %artifact.name,
                declared = mismatch.declared,
                received = mismatch.received,
                "Received size differs from declared size"
            );
        }
        tracing::info!(
            name = %artifact.name,
            bytes = artifact.len(),
            chunks = next.chunk_count,
            sha256 = %artifact.sha256,
            "Transfer complete"
        );

        self.artifact = Some(Arc::new(artifact));
    }

    fn concat(&self) -> Bytes {
        let total = self.chunks.iter().map(Bytes::len).sum();
        let mut buf = BytesMut::with_capacity(total);
        for chunk in &self.chunks {
            buf.extend_from_slice(chunk);
        }
        buf.freeze()
    }
}

/// Feed messages from `channel` into `assembler` until the attempt completes
/// or fails.
pub async fn receive_until_end<R>(
    channel: &mut R,
    assembler: &mut ReceiverAssembler,
) -> Result<Arc<Artifact>>
where
    R: PeerChannelReceiver + ?Sized,
{
    while let Some(message) = channel.recv().await {
        match assembler.handle_message(message).status {
            TransferStatus::Error => {
                let error = assembler.state().error.clone();
                return Err(error.unwrap_or(TransferError::ChannelClosed));
            }
            TransferStatus::Complete => {
                if let Some(artifact) = assembler.artifact() {
                    return Ok(artifact.clone());
                }
            }
            TransferStatus::Idle | TransferStatus::Receiving => {}
        }
    }

    let error = match channel.state() {
        ChannelState::Failed => TransferError::ConnectivityFailed,
        _ => TransferError::ChannelClosed,
    };
    Err(assembler.fail(error).error.clone().unwrap_or(TransferError::ChannelClosed))
}
