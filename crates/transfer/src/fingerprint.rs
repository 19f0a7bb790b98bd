//! Stable identities for uploads, used as location store keys.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::TransferError;

/// Fingerprint built from the absolute path and the byte length.
///
/// Cheap, but two different files with the same path and length (a file
/// rewritten in place) share a fingerprint and would resume against stale
/// remote state. Use [`content_fingerprint`] when that matters.
pub fn path_fingerprint(path: &Path) -> Result<String, TransferError> {
    let absolute = std::path::absolute(path)?;
    let len = std::fs::metadata(&absolute)?.len();
    Ok(format!("{}-{len}", absolute.display()))
}

/// Fingerprint built from the SHA-256 of the file contents and its length.
///
/// Reads the whole file once.
pub fn content_fingerprint(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    let mut len: u64 = 0;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        len += n as u64;
    }
    Ok(format!("sha256:{}-{len}", hex::encode(hasher.finalize())))
}
