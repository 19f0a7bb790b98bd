//! [`Transport`] backed by `reqwest`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::header::CONTENT_LENGTH;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::error::UploadError;
use crate::transport::{RequestBody, Transport, TusRequest, TusResponse};

/// In-flight bytes buffered between the chunk producer and the request body.
const PIPE_CAPACITY: usize = 256 * 1024;

/// Time allowed to establish a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Longest silence tolerated while reading from the server.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(120);

/// Sends exchanges with a shared `reqwest::Client`.
///
/// PATCH bodies are piped: the chunk producer writes into one end of an
/// in-memory duplex while reqwest streams the other end to the server, so
/// a chunk is only read from disk once the previous one has been taken by
/// the connection.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Wraps a caller-built client as is.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Builds a client with [`DEFAULT_CONNECT_TIMEOUT`] and
    /// [`DEFAULT_READ_TIMEOUT`].
    pub fn with_default_timeouts() -> Result<Self, UploadError> {
        Self::with_timeouts(DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT)
    }

    pub fn with_timeouts(connect: Duration, read: Duration) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect)
            .read_timeout(read)
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn execute(
        &self,
        request: TusRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TusResponse, UploadError>> + Send + '_>> {
        Box::pin(async move {
            let TusRequest {
                method,
                url,
                headers,
                body,
            } = request;
            let builder = self.client.request(method, url).headers(headers);

            let response = match body {
                RequestBody::Empty => builder.send().await?,
                RequestBody::Chunks(producer) => {
                    let len = producer.payload_len();
                    let (mut writer, reader) = tokio::io::duplex(PIPE_CAPACITY);
                    let body = reqwest::Body::wrap_stream(ReaderStream::new(reader));

                    // Must be set because the body is a stream.
                    let send = builder.header(CONTENT_LENGTH, len).body(body).send();
                    let pump = async move {
                        let result = producer.write_to(&mut writer).await;
                        // Closing the pipe ends the body even on failure.
                        let _ = writer.shutdown().await;
                        result
                    };

                    let (sent, pumped) = tokio::join!(send, pump);
                    let written = pumped?;
                    debug!(bytes = written, "PATCH body streamed");
                    sent?
                }
            };

            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            Ok(TusResponse {
                status,
                headers,
                body,
            })
        })
    }
}
