//! Streaming side of a resumable upload.
//!
//! [`ChunkProducer`] pushes a byte range of a local file into whatever sink
//! the transport hands it, one bounded chunk at a time, reporting the
//! absolute file position after every chunk.

mod chunked;
mod fingerprint;
mod progress;

pub use chunked::ChunkProducer;
pub use fingerprint::{content_fingerprint, path_fingerprint};
pub use progress::{ProgressCallback, SpeedCalculator};

/// Default chunk size: 4 MiB.
///
/// This bounds each read/write pair, not the PATCH size.
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,
}
