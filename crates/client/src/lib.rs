//! Resumable upload client for the tus 1.0 protocol.
//!
//! [`TusClient::perform`] drives one upload to completion: it resumes from
//! a location remembered in the [`UploadUrlStore`] when it can, creates a
//! new upload resource when it cannot, and streams the remaining bytes with
//! PATCH requests until the server's offset reaches the file length.
//!
//! # Flow
//!
//! 1. **Resume**: HEAD the stored location for `Upload-Offset`
//! 2. **Create**: POST when nothing usable is stored, remember `Location`
//! 3. **Transfer**: PATCH from the known offset, chunk by chunk
//! 4. **Repeat** until the offset equals the file length, then forget the
//!    location
//!
//! The HTTP layer sits behind the [`Transport`] trait; [`ReqwestTransport`]
//! is the stock implementation.

pub mod config;
pub mod descriptor;
pub mod error;
pub mod http;
pub mod orchestrator;
pub mod transport;

pub use config::ClientConfig;
pub use descriptor::UploadDescriptor;
pub use error::UploadError;
pub use http::ReqwestTransport;
pub use orchestrator::{ResumeDecision, TusClient};
pub use transport::{RequestBody, Transport, TusRequest, TusResponse, UploadRequest};

pub use tuskit_protocol::Metadata;
pub use tuskit_store::{InMemoryUrlStore, UploadUrlStore};
pub use tuskit_transfer::ProgressCallback;
