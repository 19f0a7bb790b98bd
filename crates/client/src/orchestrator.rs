//! Upload orchestrator: the create / resume / transfer state machine.
//!
//! Each round of [`TusClient::perform`] first decides where the upload
//! lives and how much of it the server already has ([`ResumeDecision`]),
//! then sends one PATCH from that offset. Rounds repeat until the offset
//! reported by the server equals the file length.

use std::sync::Arc;

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tuskit_protocol::ProtocolError;
use tuskit_protocol::headers::{
    CONTENT_TYPE, EXPECT, EXPECT_CONTINUE, LOCATION, OFFSET_OCTET_STREAM, TUS_RESUMABLE,
    UPLOAD_LENGTH, UPLOAD_METADATA, UPLOAD_OFFSET,
};
use tuskit_protocol::{parse_offset, require_location};
use tuskit_store::UploadUrlStore;
use tuskit_transfer::{ChunkProducer, ProgressCallback};
use url::Url;

use crate::config::ClientConfig;
use crate::descriptor::UploadDescriptor;
use crate::error::UploadError;
use crate::transport::{RequestBody, Transport, TusRequest, TusResponse, UploadRequest};

/// Callback invoked with the upload fingerprint.
pub type LifecycleCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Outcome of trying to resume from the location store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeDecision {
    /// The stored upload exists and the server holds `offset` bytes.
    Resumed { url: Url, offset: u64 },
    /// Nothing usable is stored; a new upload must be created.
    NeedsCreate,
}

/// Performs resumable uploads against one transport and location store.
pub struct TusClient {
    transport: Arc<dyn Transport>,
    store: Arc<dyn UploadUrlStore>,
    config: ClientConfig,
    on_started: Option<LifecycleCallback>,
    on_progress: Option<ProgressCallback>,
    on_finished: Option<LifecycleCallback>,
}

impl TusClient {
    /// Creates a client with the default [`ClientConfig`].
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn UploadUrlStore>) -> Self {
        Self {
            transport,
            store,
            config: ClientConfig::default(),
            on_started: None,
            on_progress: None,
            on_finished: None,
        }
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Called once when `perform` starts, before any exchange.
    pub fn on_upload_started(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_started = Some(Arc::new(callback));
        self
    }

    /// Called after every chunk with `(fingerprint, bytes written, total)`.
    pub fn on_progress(
        mut self,
        callback: impl Fn(&str, u64, u64) + Send + Sync + 'static,
    ) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    /// Called once the server holds every byte, before `perform` returns.
    pub fn on_upload_finished(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_finished = Some(Arc::new(callback));
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn UploadUrlStore> {
        &self.store
    }

    /// Uploads `descriptor` to the endpoint in `request`.
    ///
    /// Returns the response of the PATCH that completed the upload. On any
    /// error the stored location (if one was created) is kept, so calling
    /// `perform` again with the same fingerprint resumes from the server's
    /// offset. Dropping the returned future has the same effect.
    pub async fn perform(
        &self,
        request: &UploadRequest,
        descriptor: &UploadDescriptor,
    ) -> Result<TusResponse, UploadError> {
        self.perform_with_cancel(request, descriptor, CancellationToken::new())
            .await
    }

    /// Like [`perform`](Self::perform), stopping with
    /// [`UploadError::Cancelled`] once `cancel` fires.
    ///
    /// Cancellation is observed between chunks and also abandons an
    /// exchange still waiting on the server. The stored location is kept
    /// either way.
    pub async fn perform_with_cancel(
        &self,
        request: &UploadRequest,
        descriptor: &UploadDescriptor,
        cancel: CancellationToken,
    ) -> Result<TusResponse, UploadError> {
        let fingerprint = descriptor.fingerprint();
        let total = tokio::fs::metadata(descriptor.path()).await?.len();

        info!(
            fingerprint,
            total_bytes = total,
            content_type = descriptor.content_type().unwrap_or_default(),
            "upload started"
        );
        if let Some(callback) = &self.on_started {
            callback(fingerprint);
        }

        let mut stalled: u32 = 0;
        let response = loop {
            check_cancelled(&cancel)?;

            let decision = self
                .query_offset(request, fingerprint, total, &cancel)
                .await?;
            let (url, offset) = match decision {
                ResumeDecision::Resumed { url, offset } => (url, offset),
                ResumeDecision::NeedsCreate => {
                    check_cancelled(&cancel)?;
                    (self.create(request, descriptor, total, &cancel).await?, 0)
                }
            };

            check_cancelled(&cancel)?;
            let response = self
                .transfer(request, descriptor, &url, offset, &cancel)
                .await?;

            let new_offset = parse_offset(response.header(UPLOAD_OFFSET))?;
            if new_offset > total {
                return Err(ProtocolError::InvalidHeader {
                    header: UPLOAD_OFFSET,
                    value: new_offset.to_string(),
                }
                .into());
            }

            let bytes_left = total - new_offset;
            if bytes_left == 0 {
                break response;
            }

            if new_offset <= offset {
                stalled += 1;
                warn!(fingerprint, offset = new_offset, stalled, "server offset did not advance");
                if stalled >= self.config.max_stalled_attempts {
                    return Err(UploadError::Stalled {
                        offset: new_offset,
                        attempts: stalled,
                    });
                }
            } else {
                stalled = 0;
            }

            debug!(fingerprint, offset = new_offset, bytes_left, "upload incomplete, continuing");
        };

        info!(fingerprint, total_bytes = total, "upload finished");
        if let Some(callback) = &self.on_finished {
            callback(fingerprint);
        }
        self.store.remove(fingerprint);

        Ok(response)
    }

    /// Looks up the stored location for `fingerprint` and asks the server
    /// how much of it exists.
    ///
    /// A missing store entry, a response without a usable `Upload-Offset`
    /// (the server forgot the upload) and an offset beyond `upload_length`
    /// all mean [`ResumeDecision::NeedsCreate`]. Transport failures are
    /// returned as errors.
    pub async fn resume(
        &self,
        request: &UploadRequest,
        fingerprint: &str,
        upload_length: u64,
    ) -> Result<ResumeDecision, UploadError> {
        self.query_offset(request, fingerprint, upload_length, &CancellationToken::new())
            .await
    }

    async fn query_offset(
        &self,
        request: &UploadRequest,
        fingerprint: &str,
        upload_length: u64,
        cancel: &CancellationToken,
    ) -> Result<ResumeDecision, UploadError> {
        let Some(url) = self.store.get(fingerprint) else {
            debug!(fingerprint, "no stored location");
            return Ok(ResumeDecision::NeedsCreate);
        };

        let head = TusRequest {
            method: Method::HEAD,
            url: url.clone(),
            headers: self.base_headers(request)?,
            body: RequestBody::Empty,
        };
        let response = self.exchange(head, cancel).await?;

        match parse_offset(response.header(UPLOAD_OFFSET)) {
            Ok(offset) if offset <= upload_length => {
                info!(fingerprint, %url, offset, "resuming upload");
                Ok(ResumeDecision::Resumed { url, offset })
            }
            Ok(offset) => {
                warn!(fingerprint, %url, offset, upload_length, "stored upload is longer than the file");
                Ok(ResumeDecision::NeedsCreate)
            }
            Err(e) => {
                warn!(fingerprint, %url, status = %response.status, error = %e, "cannot resume, creating a new upload");
                Ok(ResumeDecision::NeedsCreate)
            }
        }
    }

    /// POSTs a new upload and remembers its location.
    async fn create(
        &self,
        request: &UploadRequest,
        descriptor: &UploadDescriptor,
        upload_length: u64,
        cancel: &CancellationToken,
    ) -> Result<Url, UploadError> {
        let mut headers = self.base_headers(request)?;
        let metadata = descriptor.encoded_metadata();
        if !metadata.is_empty() {
            set_header(&mut headers, UPLOAD_METADATA, HeaderValue::from_str(&metadata)?)?;
        }
        set_header(&mut headers, UPLOAD_LENGTH, HeaderValue::from(upload_length))?;

        let post = TusRequest {
            method: Method::POST,
            url: request.url.clone(),
            headers,
            body: RequestBody::Empty,
        };
        let response = self.exchange(post, cancel).await?;

        let location = require_location(response.header(LOCATION))?;
        let url = request
            .url
            .join(location)
            .map_err(|source| UploadError::InvalidLocation {
                location: location.to_string(),
                source,
            })?;

        info!(fingerprint = descriptor.fingerprint(), %url, "upload created");
        self.store.put(descriptor.fingerprint(), url.clone());
        Ok(url)
    }

    /// PATCHes the file from `offset` to `url`.
    async fn transfer(
        &self,
        request: &UploadRequest,
        descriptor: &UploadDescriptor,
        url: &Url,
        offset: u64,
        cancel: &CancellationToken,
    ) -> Result<TusResponse, UploadError> {
        let mut headers = self.base_headers(request)?;
        set_header(&mut headers, UPLOAD_OFFSET, HeaderValue::from(offset))?;
        set_header(&mut headers, CONTENT_TYPE, HeaderValue::from_static(OFFSET_OCTET_STREAM))?;
        set_header(&mut headers, EXPECT, HeaderValue::from_static(EXPECT_CONTINUE))?;

        let mut producer = ChunkProducer::open(
            descriptor.fingerprint(),
            descriptor.path(),
            offset,
            self.config.chunk_size,
            self.config.payload_size,
        )
        .await?
        .with_cancellation(cancel.clone());
        if let Some(callback) = &self.on_progress {
            producer = producer.with_progress(Arc::clone(callback));
        }

        let patch = TusRequest {
            method: Method::PATCH,
            url: url.clone(),
            headers,
            body: RequestBody::Chunks(producer),
        };
        self.exchange(patch, cancel).await
    }

    /// Caller headers plus `Tus-Resumable`.
    fn base_headers(&self, request: &UploadRequest) -> Result<HeaderMap, UploadError> {
        let mut headers = request.headers.clone();
        set_header(
            &mut headers,
            TUS_RESUMABLE,
            HeaderValue::from_str(&self.config.tus_version)?,
        )?;
        Ok(headers)
    }

    /// Runs one exchange, abandoning it as soon as `cancel` fires.
    async fn exchange(
        &self,
        request: TusRequest,
        cancel: &CancellationToken,
    ) -> Result<TusResponse, UploadError> {
        let method = request.method.clone();
        let url = request.url.clone();
        debug!(%method, %url, "sending");

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(%method, %url, "exchange abandoned");
                return Err(UploadError::Cancelled);
            }
            result = self.transport.execute(request) => result?,
        };

        debug!(%method, %url, status = %response.status, "received");
        Ok(response)
    }
}

/// Inserts a protocol header, replacing any value the caller set.
fn set_header(
    headers: &mut HeaderMap,
    name: &'static str,
    value: HeaderValue,
) -> Result<(), UploadError> {
    headers.insert(HeaderName::from_bytes(name.as_bytes())?, value);
    Ok(())
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), UploadError> {
    if cancel.is_cancelled() {
        Err(UploadError::Cancelled)
    } else {
        Ok(())
    }
}
