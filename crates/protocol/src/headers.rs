//! Header names and fixed values used on the wire.
//!
//! Names are spelled exactly as servers expect them; HTTP header lookup is
//! case-insensitive but some proxies are not.

use crate::ProtocolError;

/// Protocol version marker sent on every request.
pub const TUS_RESUMABLE: &str = "Tus-Resumable";
/// Default value of [`TUS_RESUMABLE`].
pub const TUS_VERSION: &str = "1.0.0";

/// Comma-joined `key base64(value)` pairs sent on create.
pub const UPLOAD_METADATA: &str = "Upload-Metadata";
/// Total upload length sent on create.
pub const UPLOAD_LENGTH: &str = "Upload-Length";
/// Current byte offset, sent on PATCH and returned by HEAD and PATCH.
pub const UPLOAD_OFFSET: &str = "Upload-Offset";
/// Resource URL returned by create, relative or absolute.
pub const LOCATION: &str = "Location";

pub const CONTENT_TYPE: &str = "Content-Type";
/// Content type of every PATCH body.
pub const OFFSET_OCTET_STREAM: &str = "application/offset+octet-stream";

pub const EXPECT: &str = "Expect";
pub const EXPECT_CONTINUE: &str = "100-continue";

/// Parses an `Upload-Offset` header value.
///
/// Absence and malformed values are both protocol violations.
pub fn parse_offset(value: Option<&str>) -> Result<u64, ProtocolError> {
    let raw = value.ok_or(ProtocolError::MissingHeader(UPLOAD_OFFSET))?;
    raw.trim()
        .parse::<u64>()
        .map_err(|_| ProtocolError::InvalidHeader {
            header: UPLOAD_OFFSET,
            value: raw.to_string(),
        })
}

/// Returns the `Location` value of a create response, rejecting blank ones.
pub fn require_location(value: Option<&str>) -> Result<&str, ProtocolError> {
    match value.map(str::trim) {
        Some(location) if !location.is_empty() => Ok(location),
        _ => Err(ProtocolError::MissingHeader(LOCATION)),
    }
}
