//! Tunable defaults for the downloader and job queue.

use std::time::Duration;

/// Parallel-download tuning: 12 streams, 8 MiB chunks, 1 MiB per-worker
/// read buffer, HTTP/2 enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloaderConfig {
    pub streams: usize,
    pub chunk_size: u64,
    pub buffer_size: usize,
    pub use_http2: bool,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            streams: 12,
            chunk_size: 8 * 1024 * 1024,
            buffer_size: 1024 * 1024,
            use_http2: true,
        }
    }
}

pub const IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(120);
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(15);
pub const MAX_REDIRECTS: usize = 10;

pub const MAX_CHUNK_ATTEMPTS: u32 = 10;
pub const CHUNK_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
pub const CHUNK_RETRY_MAX_DELAY: Duration = Duration::from_secs(8);
/// Bounds how long a single chunk may occupy a worker regardless of
/// forward-progress resets.
pub const CHUNK_WALL_CLOCK_CEILING: Duration = Duration::from_secs(10 * 60);

pub const PROGRESS_SAMPLE_INTERVAL: Duration = Duration::from_millis(50);
pub const SINGLE_STREAM_BUFFER_SIZE: usize = 128 * 1024;

/// Job queue tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub max_concurrent: usize,
    pub capacity: usize,
    pub cleanup_interval: Duration,
    pub retention: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            capacity: 100,
            cleanup_interval: Duration::from_secs(20 * 60),
            retention: Duration::from_secs(90 * 60),
        }
    }
}

impl QueueConfig {
    /// Suggested defaults for heavier, slower jobs (e.g. AI transcription
    /// pipelines sitting behind the same queue shape).
    pub fn heavy() -> Self {
        Self { capacity: 50, ..Self::default() }
    }
}
