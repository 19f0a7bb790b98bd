//! `Upload-Metadata` encoding.
//!
//! Entries render as `key base64(value)` joined by commas, in insertion
//! order. Servers treat the order as insignificant, but the encoding is
//! deterministic so fixtures can compare whole header values.

use base64::{Engine, engine::general_purpose::STANDARD};

use crate::ProtocolError;

/// Ordered string → string metadata attached to an upload.
///
/// Re-inserting an existing key replaces its value in place, keeping the
/// key's original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<(String, String)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an entry.
    ///
    /// Keys must be non-empty and free of spaces and commas, otherwise the
    /// header could not be split back into pairs.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ProtocolError> {
        let key = key.into();
        if key.is_empty() || key.contains([' ', ',']) {
            return Err(ProtocolError::InvalidMetadataKey(key));
        }
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, ProtocolError> {
        self.insert(key, value)?;
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Renders the `Upload-Metadata` header value. Empty metadata renders
    /// as an empty string.
    pub fn encode(&self) -> String {
        self.entries
            .iter()
            .map(|(key, value)| format!("{key} {}", STANDARD.encode(value.as_bytes())))
            .collect::<Vec<_>>()
            .join(",")
    }
}
