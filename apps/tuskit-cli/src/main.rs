//! tuskit: resumable uploads to tus servers.

mod cli;
mod config;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use clap::Parser;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use tuskit_client::{
    ClientConfig, InMemoryUrlStore, Metadata, ReqwestTransport, TusClient, UploadDescriptor,
    UploadError, UploadRequest, UploadUrlStore,
};
use tuskit_transfer::SpeedCalculator;

use cli::Cli;
use config::FileConfig;

const DEFAULT_RETRIES: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    info!(version = env!("CARGO_PKG_VERSION"), "tuskit starting");

    let file_config = FileConfig::load(cli.config.as_deref())?;
    let retries = cli.retries.or(file_config.retries).unwrap_or(DEFAULT_RETRIES);
    let headers = build_headers(&file_config, &cli)?;
    let client_config = merge_client_config(file_config.client, &cli);
    let descriptor = build_descriptor(&cli)?;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping upload");
            on_ctrl_c.cancel();
        }
    });

    let store = Arc::new(RecordingStore::default());
    let progress = ProgressReporter::new();
    let transport = ReqwestTransport::with_default_timeouts()?;
    let client = TusClient::new(Arc::new(transport), store.clone())
        .with_config(client_config)
        .on_progress(move |_, written, total| progress.report(written, total));

    let request = UploadRequest::new(cli.endpoint.clone()).with_headers(headers);
    let started = Instant::now();

    let mut attempt = 0;
    loop {
        match client
            .perform_with_cancel(&request, &descriptor, cancel.clone())
            .await
        {
            Ok(_) => break,
            Err(UploadError::Cancelled) => bail!("upload cancelled"),
            Err(e) if e.is_retryable() && attempt < retries => {
                attempt += 1;
                let delay = RETRY_BASE_DELAY * attempt;
                warn!(error = %e, attempt, retries, ?delay, "upload failed, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => bail!("upload cancelled"),
                }
            }
            Err(e) => return Err(e).context("upload failed"),
        }
    }

    let elapsed = started.elapsed().as_secs_f64();
    let bytes = std::fs::metadata(descriptor.path())?.len();
    match store.last_location() {
        Some(url) => eprintln!("Uploaded {} in {elapsed:.1}s to {url}", format_bytes(bytes)),
        None => eprintln!("Uploaded {} in {elapsed:.1}s", format_bytes(bytes)),
    }
    Ok(())
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn,tuskit=info,tuskit_client=info")),
        1 => EnvFilter::new("info,tuskit=debug,tuskit_client=debug"),
        2 => EnvFilter::new("info,tuskit=debug,tuskit_client=debug,tuskit_transfer=debug"),
        _ => EnvFilter::new("debug,tuskit_client=trace,tuskit_transfer=trace,tuskit_store=trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Config file headers first, then `-H` flags replacing same-named ones.
fn build_headers(file: &FileConfig, cli: &Cli) -> anyhow::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let pairs = file
        .headers
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .chain(cli.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes())
            .with_context(|| format!("invalid header name {name:?}"))?;
        let value = HeaderValue::from_str(value)
            .with_context(|| format!("invalid value for header {name}"))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

fn merge_client_config(mut config: ClientConfig, cli: &Cli) -> ClientConfig {
    if let Some(chunk_size) = cli.chunk_size {
        config.chunk_size = chunk_size;
    }
    if cli.payload_size.is_some() {
        config.payload_size = cli.payload_size;
    }
    config
}

/// Describes the file, adding `filename` and `filetype` metadata unless
/// given explicitly.
fn build_descriptor(cli: &Cli) -> anyhow::Result<UploadDescriptor> {
    let mut metadata = Metadata::new();
    if let Some(name) = cli.file.file_name().and_then(|n| n.to_str()) {
        metadata.insert("filename", name)?;
    }
    if let Some(content_type) = &cli.content_type {
        metadata.insert("filetype", content_type.as_str())?;
    }
    for (key, value) in &cli.metadata {
        metadata.insert(key.as_str(), value.as_str())?;
    }

    let mut descriptor = UploadDescriptor::new(&cli.file)
        .with_context(|| format!("cannot read {}", cli.file.display()))?
        .with_metadata(metadata);
    if cli.content_hash {
        descriptor = descriptor.with_content_fingerprint()?;
    }
    if let Some(content_type) = &cli.content_type {
        descriptor = descriptor.with_content_type(content_type.as_str());
    }
    Ok(descriptor)
}

// ---------------------------------------------------------------------------
// RecordingStore
// ---------------------------------------------------------------------------

/// In-memory store that also remembers the last location created, so the
/// final URL can be printed after the client has forgotten it.
#[derive(Default)]
struct RecordingStore {
    inner: InMemoryUrlStore,
    last: Mutex<Option<Url>>,
}

impl RecordingStore {
    fn last_location(&self) -> Option<Url> {
        self.last.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl UploadUrlStore for RecordingStore {
    fn put(&self, fingerprint: &str, url: Url) {
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Some(url.clone());
        self.inner.put(fingerprint, url);
    }

    fn get(&self, fingerprint: &str) -> Option<Url> {
        self.inner.get(fingerprint)
    }

    fn remove(&self, fingerprint: &str) {
        self.inner.remove(fingerprint);
    }
}

// ---------------------------------------------------------------------------
// ProgressReporter
// ---------------------------------------------------------------------------

/// Logs progress every tenth of the file with rate and ETA.
struct ProgressReporter {
    speed: SpeedCalculator,
    last_decile: AtomicU64,
}

impl ProgressReporter {
    fn new() -> Self {
        Self {
            speed: SpeedCalculator::new(None, None),
            last_decile: AtomicU64::new(0),
        }
    }

    fn report(&self, written: u64, total: u64) {
        self.speed.observe(written);
        if total == 0 {
            return;
        }

        let decile = written * 10 / total;
        if self.last_decile.swap(decile, Ordering::Relaxed) == decile {
            return;
        }
        let eta = self.speed.eta(total).map(|d| Duration::from_secs(d.as_secs()));
        info!(
            percent = decile * 10,
            sent = %format_bytes(written),
            rate = %format!("{}/s", format_bytes(self.speed.bytes_per_second() as u64)),
            ?eta,
            "progress"
        );
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
