//! Upload error types.

use std::io::ErrorKind;

use tuskit_protocol::ProtocolError;
use tuskit_transfer::TransferError;

/// Errors produced while performing an upload.
///
/// There is no partial-success variant: progress seen through callbacks is
/// informational, and the location store is what makes a failed upload
/// resumable by calling [`perform`](crate::TusClient::perform) again.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("invalid upload location {location:?}: {source}")]
    InvalidLocation {
        location: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("upload stalled at offset {offset} after {attempts} attempts")]
    Stalled { offset: u64, attempts: u32 },

    #[error("cancelled")]
    Cancelled,
}

impl UploadError {
    /// Whether calling `perform` again may succeed without intervention.
    ///
    /// Network failures, stalls and transient I/O errors are worth another
    /// attempt. A missing or unreadable source file, a server breaking the
    /// protocol or a cancelled upload are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::Io(e) => matches!(
                e.kind(),
                ErrorKind::Interrupted
                    | ErrorKind::TimedOut
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
            ),
            UploadError::Http(_) | UploadError::Transport(_) | UploadError::Stalled { .. } => {
                true
            }
            _ => false,
        }
    }
}

impl From<TransferError> for UploadError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Io(e) => UploadError::Io(e),
            TransferError::Cancelled => UploadError::Cancelled,
        }
    }
}

impl From<reqwest::header::InvalidHeaderValue> for UploadError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        UploadError::InvalidHeader(err.to_string())
    }
}

impl From<reqwest::header::InvalidHeaderName> for UploadError {
    fn from(err: reqwest::header::InvalidHeaderName) -> Self {
        UploadError::InvalidHeader(err.to_string())
    }
}
