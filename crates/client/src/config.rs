//! Client configuration.
//!
//! Every field has a default so a partial TOML/JSON document (or none at
//! all) yields a working client.

use serde::{Deserialize, Serialize};

/// Tunables for [`TusClient`](crate::TusClient).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Value sent in `Tus-Resumable` on every request.
    #[serde(default = "default_tus_version")]
    pub tus_version: String,

    /// Bytes read and written per chunk inside a PATCH body.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Upper bound on bytes sent by a single PATCH (`None` = rest of file).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_size: Option<u64>,

    /// Consecutive PATCH rounds without offset progress before giving up.
    #[serde(default = "default_max_stalled_attempts")]
    pub max_stalled_attempts: u32,
}

fn default_tus_version() -> String {
    tuskit_protocol::headers::TUS_VERSION.into()
}

fn default_chunk_size() -> usize {
    tuskit_transfer::DEFAULT_CHUNK_SIZE
}

fn default_max_stalled_attempts() -> u32 {
    3
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tus_version: default_tus_version(),
            chunk_size: default_chunk_size(),
            payload_size: None,
            max_stalled_attempts: default_max_stalled_attempts(),
        }
    }
}
