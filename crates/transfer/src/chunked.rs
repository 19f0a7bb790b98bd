use std::io::SeekFrom;
use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::progress::ProgressCallback;
use crate::{DEFAULT_CHUNK_SIZE, TransferError};

// ---------------------------------------------------------------------------
// ChunkProducer
// ---------------------------------------------------------------------------

/// Streams one byte range of a file into a sink in bounded chunks.
///
/// A producer covers a single PATCH body: it starts at `offset` and stops
/// after `payload_len` bytes or at end of file, whichever comes first.
pub struct ChunkProducer {
    id: String,
    file: tokio::fs::File,
    offset: u64,
    chunk_size: usize,
    payload_len: u64,
    total_bytes: u64,
    on_progress: Option<ProgressCallback>,
    cancel: CancellationToken,
}

impl ChunkProducer {
    /// Opens `path` for streaming from `offset`.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used. `payload_size`
    /// caps the bytes sent by this producer; `None` means "to end of file".
    /// A cap larger than what remains in the file is clamped.
    pub async fn open(
        id: impl Into<String>,
        path: &Path,
        offset: u64,
        chunk_size: usize,
        payload_size: Option<u64>,
    ) -> Result<Self, TransferError> {
        let file = tokio::fs::File::open(path).await?;
        let total_bytes = file.metadata().await?.len();
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        let available = total_bytes.saturating_sub(offset);
        let payload_len = payload_size.map_or(available, |cap| cap.min(available));

        Ok(Self {
            id: id.into(),
            file,
            offset,
            chunk_size,
            payload_len,
            total_bytes,
            on_progress: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Sets the callback invoked after every chunk.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Sets the token checked between chunks.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Upload identifier passed to the progress callback.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Byte offset the stream starts at.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Exact number of bytes [`write_to`](Self::write_to) will send unless
    /// the file shrinks underneath it.
    pub fn payload_len(&self) -> u64 {
        self.payload_len
    }

    /// Total file size in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Writes the payload to `sink`, flushing after each chunk.
    ///
    /// The progress callback receives the absolute file position reached,
    /// so a stream resumed at offset `O` reports `O + n` first. Cancellation
    /// is observed before each chunk is read; a chunk already being written
    /// is always completed.
    ///
    /// Returns the number of bytes written.
    pub async fn write_to<W>(mut self, sink: &mut W) -> Result<u64, TransferError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.file.seek(SeekFrom::Start(self.offset)).await?;

        let mut buf = vec![0u8; chunk_len(self.chunk_size, self.payload_len).max(1)];
        let mut position = self.offset;
        let mut remaining = self.payload_len;

        while remaining > 0 {
            if self.cancel.is_cancelled() {
                debug!(id = %self.id, position, "chunk stream cancelled");
                return Err(TransferError::Cancelled);
            }

            let to_read = chunk_len(buf.len(), remaining);
            let n = self.file.read(&mut buf[..to_read]).await?;
            if n == 0 {
                break;
            }

            sink.write_all(&buf[..n]).await?;
            sink.flush().await?;

            position += n as u64;
            remaining -= n as u64;
            trace!(id = %self.id, position, total = self.total_bytes, "chunk written");

            if let Some(callback) = &self.on_progress {
                callback(&self.id, position, self.total_bytes);
            }
        }

        Ok(position - self.offset)
    }
}

/// Bytes to read next: `remaining` capped at `chunk_size`, without
/// truncating `remaining` where `usize` is narrower than `u64`.
fn chunk_len(chunk_size: usize, remaining: u64) -> usize {
    usize::try_from(remaining).map_or(chunk_size, |r| r.min(chunk_size))
}
