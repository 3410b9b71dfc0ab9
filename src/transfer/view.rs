//! Presentation snapshot

use std::sync::Arc;

use serde::Serialize;

use super::artifact::Artifact;
use super::channel::ChannelState;

/// Connection status shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal for this attempt; distinct from a plain disconnect
    Failed,
}

impl From<ChannelState> for ConnectionStatus {
    fn from(state: ChannelState) -> Self {
        match state {
            ChannelState::Connecting => Self::Connecting,
            ChannelState::Open => Self::Connected,
            ChannelState::Closed => Self::Disconnected,
            ChannelState::Failed => Self::Failed,
        }
    }
}

/// What a UI needs to render a transfer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferView {
    pub connection_status: ConnectionStatus,
    pub transfer_progress: u8,
    pub is_streaming: bool,
    pub received_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Arc<Artifact>>,
}
