//! Wire-level pieces of the tus 1.0 resumable upload protocol.
//!
//! Header names, fixed header values, the `Upload-Metadata` encoding and
//! `Upload-Offset` parsing. Nothing here performs I/O.

pub mod headers;
pub mod metadata;

pub use headers::{parse_offset, require_location};
pub use metadata::Metadata;

/// Errors produced while building or reading protocol headers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("missing {0} header")]
    MissingHeader(&'static str),

    #[error("invalid {header} header: {value:?}")]
    InvalidHeader { header: &'static str, value: String },

    #[error("invalid metadata key: {0:?}")]
    InvalidMetadataKey(String),
}
