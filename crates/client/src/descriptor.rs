//! Description of one logical upload.

use std::path::{Path, PathBuf};

use tuskit_protocol::Metadata;
use tuskit_transfer::{content_fingerprint, path_fingerprint};

use crate::error::UploadError;

/// The file to upload and how to identify it.
///
/// The fingerprint keys the location store: two descriptors with the same
/// fingerprint resume each other's uploads. By default it is derived from
/// the absolute path and byte length of the file at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadDescriptor {
    path: PathBuf,
    content_type: Option<String>,
    fingerprint: String,
    metadata: Metadata,
}

impl UploadDescriptor {
    /// Describes `path` with the default path+length fingerprint.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, UploadError> {
        let path = path.into();
        let fingerprint = path_fingerprint(&path)?;
        Ok(Self {
            path,
            content_type: None,
            fingerprint,
            metadata: Metadata::new(),
        })
    }

    /// Replaces the fingerprint with the SHA-256 of the file contents.
    ///
    /// Slower to compute, but a file rewritten in place with the same
    /// length no longer resumes the stale remote upload.
    pub fn with_content_fingerprint(mut self) -> Result<Self, UploadError> {
        self.fingerprint = content_fingerprint(&self.path)?;
        Ok(self)
    }

    /// Uses a caller-chosen fingerprint.
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }

    /// Records the media type of the file. PATCH bodies are always sent as
    /// `application/offset+octet-stream` regardless.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// `Upload-Metadata` header value, recomputed on each call.
    pub fn encoded_metadata(&self) -> String {
        self.metadata.encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_fingerprint_is_path_and_length() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("video.mp4");
        std::fs::write(&path, vec![0u8; 1234]).unwrap();

        let desc = UploadDescriptor::new(&path).unwrap();
        assert_eq!(desc.fingerprint(), format!("{}-1234", path.display()));
        assert_eq!(desc.path(), path.as_path());
        assert!(desc.content_type().is_none());
        assert_eq!(desc.encoded_metadata(), "");
    }

    #[test]
    fn missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let result = UploadDescriptor::new(dir.path().join("absent"));
        assert!(matches!(result, Err(UploadError::Io(_))));
    }

    #[test]
    fn builder_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, b"%PDF").unwrap();

        let meta = Metadata::new()
            .with("filename", "doc.pdf")
            .unwrap()
            .with("filetype", "application/pdf")
            .unwrap();
        let desc = UploadDescriptor::new(&path)
            .unwrap()
            .with_fingerprint("custom")
            .with_content_type("application/pdf")
            .with_metadata(meta);

        assert_eq!(desc.fingerprint(), "custom");
        assert_eq!(desc.content_type(), Some("application/pdf"));
        assert_eq!(
            desc.encoded_metadata(),
            "filename ZG9jLnBkZg==,filetype YXBwbGljYXRpb24vcGRm"
        );
    }

    #[test]
    fn content_fingerprint_differs_from_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"abc").unwrap();

        let desc = UploadDescriptor::new(&path)
            .unwrap()
            .with_content_fingerprint()
            .unwrap();
        assert!(desc.fingerprint().starts_with("sha256:"));
    }
}
