//! Request/response descriptions exchanged with the HTTP layer.
//!
//! The orchestrator never touches sockets. It hands a [`TusRequest`] to a
//! [`Transport`] and reads the [`TusResponse`] it gets back, which keeps
//! the protocol logic testable with scripted transports.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use tuskit_transfer::ChunkProducer;
use url::Url;

use crate::error::UploadError;

/// Executes one HTTP exchange.
///
/// Implementations must drive a [`RequestBody::Chunks`] body to completion
/// (or failure) before resolving, and surface its error in preference to
/// whatever the server answered.
pub trait Transport: Send + Sync {
    fn execute(
        &self,
        request: TusRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TusResponse, UploadError>> + Send + '_>>;
}

/// The caller's request the upload is performed for.
///
/// `url` is the creation endpoint; `Location` headers are resolved against
/// it. `headers` (auth and the like) are sent on every exchange, with the
/// protocol headers layered on top.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub url: Url,
    pub headers: HeaderMap,
}

impl UploadRequest {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// Body of an outgoing exchange.
pub enum RequestBody {
    Empty,
    /// Streamed file bytes for a PATCH.
    Chunks(ChunkProducer),
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Chunks(producer) => f
                .debug_struct("Chunks")
                .field("offset", &producer.offset())
                .field("payload_len", &producer.payload_len())
                .finish(),
        }
    }
}

/// An outgoing exchange.
#[derive(Debug)]
pub struct TusRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

/// What came back from an exchange.
#[derive(Debug, Clone)]
pub struct TusResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TusResponse {
    /// Returns a header as text. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
