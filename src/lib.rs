//! Parallel ranged-download engine, asynchronous job queue, and pluggable
//! media-extraction layer.
//!
//! The three CORE subsystems are [`extractor`] (URL → descriptor
//! dispatch), [`downloader`] (descriptor → file at maximum achievable
//! throughput), and [`queue`] (bounded worker pool exposing progress,
//! cancellation, and history pruning to CLI and HTTP clients alike).

pub mod cancel;
pub mod config;
pub mod descriptor;
pub mod downloader;
pub mod error;
pub mod extractor;
pub mod fallback;
pub mod filename;
pub mod health;
pub mod http_api;
pub mod job;
pub mod pipeline;
pub mod planner;
pub mod prober;
pub mod progress;
pub mod pwrite;
pub mod queue;

use crate::cancel::CancellationToken;
use crate::config::{DownloaderConfig, QueueConfig};
use crate::error::FetchError;
use crate::extractor::{DirectExtractor, ExtractorRegistry};
use crate::progress::ProgressSnapshot;
use crate::queue::{DownloadFn, JobQueue};
use futures_util::FutureExt;
use std::path::PathBuf;
use std::sync::Arc;

/// Initializes a `tracing` subscriber reading `RUST_LOG` (or `info` by
/// default), matching the ambient logging every module in this crate
/// emits through. Call once at process start; a library consumer embedding
/// this crate may skip it and install its own subscriber instead.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// The directory downloads land in when a caller doesn't configure one
/// explicitly: the platform download directory, falling back to the
/// current directory. Configuration-file-driven overrides remain an
/// external collaborator's job.
pub fn default_output_dir() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Top-level facade combining dispatch, download, and the job queue into
/// two programmatic surfaces: a synchronous single-call download, and an
/// asynchronous job-handle surface backed by [`JobQueue`].
pub struct FetchClient {
    registry: Arc<ExtractorRegistry>,
    output_dir: PathBuf,
    downloader_config: DownloaderConfig,
}

impl FetchClient {
    pub fn new(output_dir: PathBuf) -> Result<Self, FetchError> {
        let registry = ExtractorRegistry::new(DirectExtractor::new()?);
        Ok(Self { registry: Arc::new(registry), output_dir, downloader_config: DownloaderConfig::default() })
    }

    pub fn with_downloader_config(mut self, config: DownloaderConfig) -> Self {
        self.downloader_config = config;
        self
    }

    pub fn registry_mut(&mut self) -> &mut ExtractorRegistry {
        Arc::get_mut(&mut self.registry).expect("registry not yet shared with a queue")
    }

    /// Synchronous (blocking-until-done) surface: dispatch, select a
    /// format, and download it, invoking `on_progress` as bytes arrive.
    pub async fn download_url(
        &self,
        url: &str,
        caller_filename: Option<&str>,
        on_progress: impl FnMut(ProgressSnapshot) + Send + 'static,
    ) -> Result<downloader::DownloadOutcome, FetchError> {
        let (selected, path) = pipeline::resolve(&self.registry, url, &self.output_dir, caller_filename).await?;
        let auth = selected.headers.get("Authorization").cloned();
        downloader::download_with_auth(
            &selected.url,
            auth.as_deref(),
            &path,
            None,
            self.downloader_config,
            CancellationToken::new(),
            on_progress,
        )
        .await
    }

    /// Builds a [`JobQueue`] whose worker download function runs this
    /// client's dispatch+download pipeline. The async job-handle surface:
    /// callers `add()` a URL and poll/observe the returned `JobView`.
    pub fn build_queue(&self, queue_config: QueueConfig) -> JobQueue {
        let registry = self.registry.clone();
        let output_dir = self.output_dir.clone();
        let downloader_config = self.downloader_config;

        let download_fn: DownloadFn = Arc::new(move |_job_id, url, filename, cancel, on_progress| {
            let registry = registry.clone();
            let output_dir = output_dir.clone();
            async move {
                let filename_opt = if filename.is_empty() { None } else { Some(filename.as_str()) };
                let (selected, path) = pipeline::resolve(&registry, &url, &output_dir, filename_opt)
                    .await
                    .map_err(|e| e.to_string())?;
                let auth = selected.headers.get("Authorization").cloned();
                downloader::download_with_auth(
                    &selected.url,
                    auth.as_deref(),
                    &path,
                    None,
                    downloader_config,
                    cancel,
                    move |snap| on_progress(snap.downloaded, snap.total),
                )
                .await
                .map(|_| path)
                .map_err(|e| e.to_string())
            }
            .boxed()
        });

        JobQueue::new(queue_config, self.output_dir.clone(), download_fn)
    }
}
