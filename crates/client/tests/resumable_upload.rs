//! End-to-end uploads against an in-process tus server.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use url::Url;

use tuskit_client::{
    ClientConfig, InMemoryUrlStore, Metadata, RequestBody, Transport, TusClient, TusRequest,
    TusResponse, UploadDescriptor, UploadError, UploadRequest, UploadUrlStore,
};

const ENDPOINT: &str = "http://tus.local/files/";

// ---------------------------------------------------------------------------
// MockTusServer
// ---------------------------------------------------------------------------

struct Resource {
    length: u64,
    metadata: Option<String>,
    data: Vec<u8>,
}

/// Keeps upload resources in memory and speaks just enough tus to be
/// driven by the client.
#[derive(Default)]
struct MockTusServer {
    resources: Mutex<HashMap<String, Resource>>,
    next_id: AtomicUsize,
    /// Bytes kept per PATCH; the rest of the body is discarded.
    accept_limit: Option<usize>,
    requests: Mutex<Vec<Method>>,
}

impl MockTusServer {
    fn with_accept_limit(limit: usize) -> Self {
        Self {
            accept_limit: Some(limit),
            ..Default::default()
        }
    }

    fn count(&self, method: Method) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|m| **m == method)
            .count()
    }

    fn upload(&self, url: &Url) -> Option<(u64, Option<String>, Vec<u8>)> {
        self.resources
            .lock()
            .unwrap()
            .get(url.path())
            .map(|r| (r.length, r.metadata.clone(), r.data.clone()))
    }

    fn only_upload(&self) -> (u64, Option<String>, Vec<u8>) {
        let resources = self.resources.lock().unwrap();
        assert_eq!(resources.len(), 1, "expected a single upload resource");
        let r = resources.values().next().unwrap();
        (r.length, r.metadata.clone(), r.data.clone())
    }

    fn forget_all(&self) {
        self.resources.lock().unwrap().clear();
    }

    async fn handle(&self, request: TusRequest) -> Result<TusResponse, UploadError> {
        self.requests.lock().unwrap().push(request.method.clone());
        assert_eq!(request.headers["tus-resumable"], "1.0.0");

        let path = request.url.path().to_string();
        match request.method {
            Method::POST => {
                let length = request.headers["upload-length"]
                    .to_str()
                    .unwrap()
                    .parse()
                    .unwrap();
                let metadata = request
                    .headers
                    .get("upload-metadata")
                    .map(|v| v.to_str().unwrap().to_string());
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                let location = format!("/files/{id}");
                self.resources.lock().unwrap().insert(
                    location.clone(),
                    Resource {
                        length,
                        metadata,
                        data: Vec::new(),
                    },
                );
                Ok(reply(StatusCode::CREATED, &[("location", location)]))
            }
            Method::HEAD => {
                let resources = self.resources.lock().unwrap();
                match resources.get(&path) {
                    Some(r) => Ok(reply(
                        StatusCode::OK,
                        &[
                            ("upload-offset", r.data.len().to_string()),
                            ("upload-length", r.length.to_string()),
                        ],
                    )),
                    None => Ok(reply(StatusCode::NOT_FOUND, &[])),
                }
            }
            Method::PATCH => {
                assert_eq!(
                    request.headers["content-type"],
                    "application/offset+octet-stream"
                );
                let offset: usize = request.headers["upload-offset"]
                    .to_str()
                    .unwrap()
                    .parse()
                    .unwrap();

                let mut body = Vec::new();
                let streamed = match request.body {
                    RequestBody::Chunks(producer) => producer.write_to(&mut body).await,
                    RequestBody::Empty => Ok(0),
                };
                if let Some(limit) = self.accept_limit {
                    body.truncate(limit);
                }

                let new_offset = {
                    let mut resources = self.resources.lock().unwrap();
                    let Some(r) = resources.get_mut(&path) else {
                        return Ok(reply(StatusCode::NOT_FOUND, &[]));
                    };
                    if r.data.len() != offset {
                        return Ok(reply(StatusCode::CONFLICT, &[]));
                    }
                    // Whatever arrived before an interruption is kept.
                    r.data.extend_from_slice(&body);
                    r.data.len()
                };
                streamed?;

                Ok(reply(
                    StatusCode::NO_CONTENT,
                    &[("upload-offset", new_offset.to_string())],
                ))
            }
            other => panic!("unexpected method {other}"),
        }
    }
}

impl Transport for MockTusServer {
    fn execute(
        &self,
        request: TusRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TusResponse, UploadError>> + Send + '_>> {
        Box::pin(self.handle(request))
    }
}

fn reply(status: StatusCode, headers: &[(&'static str, String)]) -> TusResponse {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.insert(*name, HeaderValue::from_str(value).unwrap());
    }
    TusResponse {
        status,
        headers: map,
        body: Bytes::new(),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn sample_file(dir: &Path, len: usize) -> (PathBuf, Vec<u8>) {
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    let path = dir.join("sample.bin");
    std::fs::write(&path, &data).unwrap();
    (path, data)
}

fn endpoint() -> UploadRequest {
    UploadRequest::new(Url::parse(ENDPOINT).unwrap())
}

fn config(chunk_size: usize, payload_size: Option<u64>) -> ClientConfig {
    ClientConfig {
        chunk_size,
        payload_size,
        ..ClientConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn uploads_file_with_metadata() {
    let dir = TempDir::new().unwrap();
    let (path, data) = sample_file(dir.path(), 1000);
    let server = Arc::new(MockTusServer::default());
    let store = Arc::new(InMemoryUrlStore::new());
    let client = TusClient::new(server.clone(), store.clone()).with_config(config(64, None));

    let desc = UploadDescriptor::new(&path)
        .unwrap()
        .with_metadata(Metadata::new().with("filename", "sample.bin").unwrap());
    let response = client.perform(&endpoint(), &desc).await.unwrap();

    assert_eq!(response.header("Upload-Offset"), Some("1000"));
    let (length, metadata, received) = server.only_upload();
    assert_eq!(length, 1000);
    assert_eq!(metadata.as_deref(), Some("filename c2FtcGxlLmJpbg=="));
    assert_eq!(received, data);
    assert_eq!(server.count(Method::POST), 1);
    assert_eq!(server.count(Method::PATCH), 1);
    assert!(store.is_empty());
}

#[tokio::test]
async fn server_accepting_partial_bodies() {
    let dir = TempDir::new().unwrap();
    let (path, data) = sample_file(dir.path(), 30);
    let server = Arc::new(MockTusServer::with_accept_limit(7));
    let store = Arc::new(InMemoryUrlStore::new());

    let progress = Arc::new(Mutex::new(Vec::new()));
    let p = progress.clone();
    let client = TusClient::new(server.clone(), store.clone())
        .with_config(config(4, None))
        .on_progress(move |_, written, total| {
            assert_eq!(total, 30);
            p.lock().unwrap().push(written);
        });

    let desc = UploadDescriptor::new(&path).unwrap();
    client.perform(&endpoint(), &desc).await.unwrap();

    let (_, _, received) = server.only_upload();
    assert_eq!(received, data);
    assert_eq!(server.count(Method::POST), 1);
    // 30 bytes at 7 per PATCH.
    assert_eq!(server.count(Method::PATCH), 5);
    assert_eq!(server.count(Method::HEAD), 4);

    // Discarded bytes are sent again, so positions repeat but end at 30.
    let seen = progress.lock().unwrap();
    assert_eq!(seen.first(), Some(&4));
    assert_eq!(seen.last(), Some(&30));
}

#[tokio::test]
async fn payload_cap_splits_patches() {
    let dir = TempDir::new().unwrap();
    let (path, data) = sample_file(dir.path(), 100);
    let server = Arc::new(MockTusServer::default());
    let store = Arc::new(InMemoryUrlStore::new());
    let client = TusClient::new(server.clone(), store).with_config(config(16, Some(40)));

    let desc = UploadDescriptor::new(&path).unwrap();
    client.perform(&endpoint(), &desc).await.unwrap();

    assert_eq!(server.only_upload().2, data);
    assert_eq!(server.count(Method::PATCH), 3);
}

#[tokio::test]
async fn cancelled_upload_resumes_where_it_stopped() {
    let dir = TempDir::new().unwrap();
    let (path, data) = sample_file(dir.path(), 40);
    let server = Arc::new(MockTusServer::default());
    let store = Arc::new(InMemoryUrlStore::new());
    let cancel = CancellationToken::new();

    let progress = Arc::new(Mutex::new(Vec::new()));
    let p = progress.clone();
    let c = cancel.clone();
    let client = TusClient::new(server.clone(), store.clone())
        .with_config(config(4, None))
        .on_progress(move |_, written, _| {
            p.lock().unwrap().push(written);
            if written == 12 {
                c.cancel();
            }
        });
    let desc = UploadDescriptor::new(&path).unwrap();

    let first = client.perform_with_cancel(&endpoint(), &desc, cancel).await;
    assert!(matches!(first, Err(UploadError::Cancelled)));

    let url = store.get(desc.fingerprint()).expect("location kept after cancel");
    let (_, _, partial) = server.upload(&url).unwrap();
    assert_eq!(partial, &data[..12]);

    client.perform(&endpoint(), &desc).await.unwrap();

    assert_eq!(server.only_upload().2, data);
    assert_eq!(server.count(Method::POST), 1);
    assert_eq!(server.count(Method::HEAD), 1);
    let expected: Vec<u64> = (1..=10).map(|i| i * 4).collect();
    assert_eq!(*progress.lock().unwrap(), expected);
    assert!(store.get(desc.fingerprint()).is_none());
}

#[tokio::test]
async fn forgotten_upload_is_recreated() {
    let dir = TempDir::new().unwrap();
    let (path, data) = sample_file(dir.path(), 20);
    let server = Arc::new(MockTusServer::default());
    let store = Arc::new(InMemoryUrlStore::new());
    let desc = UploadDescriptor::new(&path).unwrap();
    store.put(
        desc.fingerprint(),
        Url::parse("http://tus.local/files/expired").unwrap(),
    );

    let client = TusClient::new(server.clone(), store.clone());
    client.perform(&endpoint(), &desc).await.unwrap();

    assert_eq!(server.count(Method::HEAD), 1);
    assert_eq!(server.count(Method::POST), 1);
    assert_eq!(server.only_upload().2, data);
    assert!(store.is_empty());
}

#[tokio::test]
async fn server_forgetting_mid_upload_restarts_from_zero() {
    let dir = TempDir::new().unwrap();
    let (path, data) = sample_file(dir.path(), 16);
    let server = Arc::new(MockTusServer::default());
    let store = Arc::new(InMemoryUrlStore::new());
    let cancel = CancellationToken::new();

    let c = cancel.clone();
    let client = TusClient::new(server.clone(), store.clone())
        .with_config(config(4, None))
        .on_progress(move |_, written, _| {
            if written == 8 {
                c.cancel();
            }
        });
    let desc = UploadDescriptor::new(&path).unwrap();

    let first = client.perform_with_cancel(&endpoint(), &desc, cancel).await;
    assert!(matches!(first, Err(UploadError::Cancelled)));

    server.forget_all();
    client.perform(&endpoint(), &desc).await.unwrap();

    assert_eq!(server.count(Method::POST), 2);
    assert_eq!(server.only_upload().2, data);
}

#[tokio::test]
async fn empty_file_completes_with_one_patch() {
    let dir = TempDir::new().unwrap();
    let (path, _) = sample_file(dir.path(), 0);
    let server = Arc::new(MockTusServer::default());
    let client = TusClient::new(server.clone(), Arc::new(InMemoryUrlStore::new()));

    let desc = UploadDescriptor::new(&path).unwrap();
    let response = client.perform(&endpoint(), &desc).await.unwrap();

    assert_eq!(response.header("Upload-Offset"), Some("0"));
    assert_eq!(server.count(Method::PATCH), 1);
    assert_eq!(server.only_upload().0, 0);
}

#[tokio::test]
async fn trait_object_store_is_shared_between_clients() {
    let dir = TempDir::new().unwrap();
    let (path, data) = sample_file(dir.path(), 24);
    let server = Arc::new(MockTusServer::default());
    let store: Arc<dyn UploadUrlStore> = Arc::new(InMemoryUrlStore::new());
    let cancel = CancellationToken::new();

    let c = cancel.clone();
    let first = TusClient::new(server.clone(), store.clone())
        .with_config(config(8, None))
        .on_progress(move |_, _, _| c.cancel());
    let desc = UploadDescriptor::new(&path).unwrap();
    assert!(
        first
            .perform_with_cancel(&endpoint(), &desc, cancel)
            .await
            .is_err()
    );

    let second = TusClient::new(server.clone(), store.clone());
    second.perform(&endpoint(), &desc).await.unwrap();

    assert_eq!(server.count(Method::POST), 1);
    assert_eq!(server.only_upload().2, data);
}
