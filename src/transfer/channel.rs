//! Peer channel abstraction
//!
//! The transfer protocol rides on an ordered, reliable, message-oriented
//! channel between the two clients. The sending half exposes how much data
//! is still queued and a readiness signal, so a sender can pause instead of
//! piling slices into the transport.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Notify};

use super::error::{Result, TransferError};
use super::protocol::ChannelMessage;
use super::types::BUFFERED_AMOUNT_LOW;

/// Channel readiness as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
    /// Connectivity negotiation gave up
    Failed,
}

/// Sending half of a peer channel
#[async_trait]
pub trait PeerChannel: Send + Sync {
    /// Current readiness
    fn state(&self) -> ChannelState;

    /// Queue one message. Fails unless the channel is open.
    async fn send(&self, message: ChannelMessage) -> Result<()>;

    /// Bytes queued but not yet consumed by the remote side
    fn buffered_amount(&self) -> usize;

    /// Resolve once the buffered amount drops to the low-water mark.
    /// Fails if the channel stops being open while waiting.
    async fn wait_writable(&self) -> Result<()>;
}

/// Receiving half of a peer channel
#[async_trait]
pub trait PeerChannelReceiver: Send {
    /// Current readiness
    fn state(&self) -> ChannelState;

    /// Next message in send order; `None` once the channel is closed
    async fn recv(&mut self) -> Option<ChannelMessage>;
}

/// Error to report for a send attempted in `state`
pub fn not_open_error(state: ChannelState) -> TransferError {
    match state {
        ChannelState::Connecting => TransferError::ChannelNotReady,
        ChannelState::Failed => TransferError::ConnectivityFailed,
        ChannelState::Open | ChannelState::Closed => TransferError::ChannelClosed,
    }
}

// ============================================================================
// In-Memory Channel
// ============================================================================

struct Shared {
    state: watch::Sender<ChannelState>,
    buffered: AtomicUsize,
    drained: Notify,
    low_water_mark: usize,
}

impl Shared {
    fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ChannelState) {
        self.state.send_replace(state);
        self.drained.notify_waiters();
    }
}

/// Sending half of an in-process channel
#[derive(Clone)]
pub struct MemoryChannel {
    tx: mpsc::UnboundedSender<ChannelMessage>,
    shared: Arc<Shared>,
}

/// Receiving half of an in-process channel
pub struct MemoryChannelReceiver {
    rx: mpsc::UnboundedReceiver<ChannelMessage>,
    shared: Arc<Shared>,
}

/// Create an open in-process channel with the default low-water mark
pub fn memory_channel() -> (MemoryChannel, MemoryChannelReceiver) {
    memory_channel_with(ChannelState::Open, BUFFERED_AMOUNT_LOW)
}

/// Create an in-process channel in `state` with a custom low-water mark
pub fn memory_channel_with(
    state: ChannelState,
    low_water_mark: usize,
) -> (MemoryChannel, MemoryChannelReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (state, _) = watch::channel(state);
    let shared = Arc::new(Shared {
        state,
        buffered: AtomicUsize::new(0),
        drained: Notify::new(),
        low_water_mark,
    });

    (
        MemoryChannel {
            tx,
            shared: shared.clone(),
        },
        MemoryChannelReceiver { rx, shared },
    )
}

impl MemoryChannel {
    /// Mark the channel open
    pub fn open(&self) {
        self.shared.set_state(ChannelState::Open);
    }

    /// Close the channel
    pub fn close(&self) {
        self.shared.set_state(ChannelState::Closed);
    }

    /// Simulate a connectivity failure
    pub fn fail(&self) {
        self.shared.set_state(ChannelState::Failed);
    }

    /// Watch state changes
    pub fn subscribe(&self) -> watch::Receiver<ChannelState> {
        self.shared.state.subscribe()
    }
}

#[async_trait]
impl PeerChannel for MemoryChannel {
    fn state(&self) -> ChannelState {
        self.shared.state()
    }

    async fn send(&self, message: ChannelMessage) -> Result<()> {
        let state = self.shared.state();
        if state != ChannelState::Open {
            return Err(not_open_error(state));
        }

        let len = message.len();
        self.shared.buffered.fetch_add(len, Ordering::SeqCst);
        if self.tx.send(message).is_err() {
            self.shared.buffered.fetch_sub(len, Ordering::SeqCst);
            self.shared.set_state(ChannelState::Closed);
            return Err(TransferError::ChannelClosed);
        }
        Ok(())
    }

    fn buffered_amount(&self) -> usize {
        self.shared.buffered.load(Ordering::SeqCst)
    }

    async fn wait_writable(&self) -> Result<()> {
        loop {
            let notified = self.shared.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let state = self.shared.state();
            if state != ChannelState::Open {
                return Err(not_open_error(state));
            }
            if self.buffered_amount() <= self.shared.low_water_mark {
                return Ok(());
            }

            notified.await;
        }
    }
}

#[async_trait]
impl PeerChannelReceiver for MemoryChannelReceiver {
    fn state(&self) -> ChannelState {
        self.shared.state()
    }

    async fn recv(&mut self) -> Option<ChannelMessage> {
        match self.rx.recv().await {
            Some(message) => {
                let len = message.len();
                let before = self.shared.buffered.fetch_sub(len, Ordering::SeqCst);
                if before.saturating_sub(len) <= self.shared.low_water_mark {
                    self.shared.drained.notify_waiters();
                }
                Some(message)
            }
            None => {
                if self.shared.state() == ChannelState::Open {
                    self.shared.set_state(ChannelState::Closed);
                }
                None
            }
        }
    }
}

impl Drop for MemoryChannelReceiver {
    fn drop(&mut self) {
        if self.shared.state() == ChannelState::Open {
            self.shared.set_state(ChannelState::Closed);
        }
    }
}
