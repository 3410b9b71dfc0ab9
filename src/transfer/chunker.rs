//! Sender-side slicing
//!
//! Reads a source in fixed-size slices and pushes them onto a peer channel
//! as `metadata`, `chunk`*, `end`. Before each slice the sender checks the
//! channel's buffered amount and waits for the writable signal once adding
//! the slice would cross the high-water mark.

use std::path::Path;

use bytes::{Bytes, BytesMut};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;

use super::channel::{not_open_error, ChannelState, PeerChannel};
use super::error::{Result, TransferError};
use super::protocol::{encode, ChunkFraming};
use super::types::{
    progress_percent, TransferMessage, TransferMetadata, BUFFERED_AMOUNT_HIGH, CHUNK_SIZE,
};

/// Sender status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SendStatus {
    Idle,
    Transferring,
    Complete,
    Error,
}

/// Sender progress, published after every slice
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendProgress {
    pub sent_bytes: u64,
    pub total_bytes: u64,
    pub progress: u8,
    pub status: SendStatus,
}

impl Default for SendProgress {
    fn default() -> Self {
        Self {
            sent_bytes: 0,
            total_bytes: 0,
            progress: 0,
            status: SendStatus::Idle,
        }
    }
}

/// Tunables for `SenderChunker`
#[derive(Debug, Clone, Copy)]
pub struct ChunkerOptions {
    /// Slice size in bytes
    pub chunk_size: usize,
    /// Pause once buffered + next slice would exceed this
    pub high_water_mark: usize,
    pub framing: ChunkFraming,
}

impl Default for ChunkerOptions {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            high_water_mark: BUFFERED_AMOUNT_HIGH,
            framing: ChunkFraming::default(),
        }
    }
}

/// Sends one file per call to `send`
pub struct SenderChunker {
    options: ChunkerOptions,
    progress: watch::Sender<SendProgress>,
}

impl Default for SenderChunker {
    fn default() -> Self {
        Self::new(ChunkerOptions::default())
    }
}

impl SenderChunker {
    pub fn new(options: ChunkerOptions) -> Self {
        let (progress, _) = watch::channel(SendProgress::default());
        Self { options, progress }
    }

    pub fn options(&self) -> &ChunkerOptions {
        &self.options
    }

    /// Watch progress updates
    pub fn subscribe(&self) -> watch::Receiver<SendProgress> {
        self.progress.subscribe()
    }

    /// Latest progress
    pub fn progress(&self) -> SendProgress {
        self.progress.borrow().clone()
    }

    /// Open `path` and send it
    pub async fn send_file<C>(&self, path: impl AsRef<Path>, channel: &C) -> Result<u64>
    where
        C: PeerChannel + ?Sized,
    {
        let (metadata, file) = open_source(path).await?;
        self.send(metadata, file, channel).await
    }

    /// Send `source` described by `metadata`, returning the bytes sent.
    ///
    /// Any failure aborts the attempt; there is no resumption.
    pub async fn send<R, C>(&self, metadata: TransferMetadata, source: R, channel: &C) -> Result<u64>
    where
        R: AsyncRead + Unpin,
        C: PeerChannel + ?Sized,
    {
        let state = channel.state();
        if state != ChannelState::Open {
            tracing::warn!(state = ?state, name = %metadata.name, "Peer channel not open; refusing to send");
            self.publish(0, metadata.size, SendStatus::Error);
            return Err(not_open_error(state));
        }

        let total_bytes = metadata.size;
        self.publish(0, total_bytes, SendStatus::Transferring);

        match self.send_inner(metadata, source, channel).await {
            Ok(sent) => {
                self.progress.send_modify(|p| {
                    p.sent_bytes = sent;
                    p.progress = 100;
                    p.status = SendStatus::Complete;
                });
                Ok(sent)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Transfer aborted");
                self.progress.send_modify(|p| p.status = SendStatus::Error);
                Err(err)
            }
        }
    }

    async fn send_inner<R, C>(&self, metadata: TransferMetadata, mut source: R, channel: &C) -> Result<u64>
    where
        R: AsyncRead + Unpin,
        C: PeerChannel + ?Sized,
    {
        let total_bytes = metadata.size;
        let name = metadata.name.clone();
        let framing = self.options.framing;
        let chunk_size = self.options.chunk_size.max(1);

        tracing::info!(
            name = %name,
            mime_type = %metadata.mime_type,
            size = total_bytes,
            "Sending file"
        );
        channel
            .send(encode(&TransferMessage::Metadata(metadata), framing)?)
            .await?;

        let mut sent: u64 = 0;
        let mut slices: u64 = 0;
        loop {
            let slice = read_slice(&mut source, chunk_size).await?;
            if slice.is_empty() {
                break;
            }

            self.wait_for_buffer_space(channel, slice.len()).await?;

            let len = slice.len() as u64;
            channel
                .send(encode(&TransferMessage::Chunk(slice), framing)?)
                .await?;

            sent += len;
            slices += 1;
            self.publish(sent, total_bytes, SendStatus::Transferring);
            tracing::debug!(sent_bytes = sent, total_bytes, "Sent chunk");
        }

        channel.send(encode(&TransferMessage::End, framing)?).await?;

        if sent != total_bytes {
            tracing::warn!(
                name = %name,
                declared = total_bytes,
                sent,
                "Source length differs from declared size"
            );
        }
        tracing::info!(name = %name, bytes = sent, chunks = slices, "File sent");

        Ok(sent)
    }

    /// Wait until the channel has room for `next_len` more bytes
    async fn wait_for_buffer_space<C>(&self, channel: &C, next_len: usize) -> Result<()>
    where
        C: PeerChannel + ?Sized,
    {
        let buffered = channel.buffered_amount();
        if buffered + next_len <= self.options.high_water_mark {
            return Ok(());
        }

        tracing::debug!(
            buffered,
            next_len,
            high_water_mark = self.options.high_water_mark,
            "Applying backpressure"
        );
        channel.wait_writable().await
    }

    fn publish(&self, sent_bytes: u64, total_bytes: u64, status: SendStatus) {
        self.progress.send_replace(SendProgress {
            sent_bytes,
            total_bytes,
            progress: progress_percent(sent_bytes, total_bytes),
            status,
        });
    }
}

/// Fill up to `size` bytes, short only at end of input
async fn read_slice<R>(source: &mut R, size: usize) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::zeroed(size);
    let mut filled = 0;
    while filled < size {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf.freeze())
}

/// Open a file and describe it (name, guessed MIME type, size)
pub async fn open_source(path: impl AsRef<Path>) -> Result<(TransferMetadata, tokio::fs::File)> {
    let path = path.as_ref();
    let file = tokio::fs::File::open(path).await?;
    let size = file.metadata().await?.len();

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| TransferError::Io(format!("not a file path: {}", path.display())))?;
    let mime_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();

    Ok((TransferMetadata::new(name, mime_type, size), file))
}
