//! Ranged multi-stream downloader: parallel workers fetching chunks and
//! writing them via positioned writes, with resumable per-chunk retry.

use crate::cancel::CancellationToken;
use crate::config::{
    DownloaderConfig, CHUNK_RETRY_BASE_DELAY, CHUNK_RETRY_MAX_DELAY, CHUNK_WALL_CLOCK_CEILING,
    MAX_CHUNK_ATTEMPTS, PROGRESS_SAMPLE_INTERVAL,
};
use crate::error::{FetchError, FetchResult};
use crate::fallback;
use crate::planner::{self, Chunk};
use crate::prober;
use crate::progress::{spawn_ticker, ProgressSnapshot, ProgressState};
use crate::pwrite;
use futures_util::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, RANGE};
use reqwest::Client;
use std::fs::File;
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

/// Result of a completed download: final byte count and whether the
/// single-stream fallback path was used.
#[derive(Debug, Clone, Copy)]
pub struct DownloadOutcome {
    pub total_bytes: u64,
    pub used_fallback: bool,
}

fn build_client(config: &DownloaderConfig) -> FetchResult<Client> {
    let mut builder = Client::builder()
        .user_agent(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        )
        .redirect(reqwest::redirect::Policy::limited(crate::config::MAX_REDIRECTS))
        .pool_idle_timeout(crate::config::IDLE_CONNECTION_TIMEOUT)
        .no_gzip()
        .no_brotli()
        .no_deflate();
    if !config.use_http2 {
        builder = builder.http1_only();
    }
    builder.build().map_err(FetchError::from)
}

/// Downloads `url` into `output_path` using `config.streams` parallel
/// ranged workers, falling back to a sequential copy when the server
/// doesn't honor `Range:`.
pub async fn download(
    url: &str,
    output_path: &std::path::Path,
    config: DownloaderConfig,
    cancel: CancellationToken,
    on_progress: impl FnMut(ProgressSnapshot) + Send + 'static,
) -> FetchResult<DownloadOutcome> {
    download_with_auth(url, None, output_path, None, config, cancel, on_progress).await
}

/// Same as [`download`] but with an `Authorization` header and an optional
/// `total_size_hint` a caller that already probed the descriptor can pass
/// to skip re-probing.
#[instrument(skip(on_progress, cancel), fields(url = %url))]
pub async fn download_with_auth(
    url: &str,
    auth_header: Option<&str>,
    output_path: &std::path::Path,
    total_size_hint: Option<u64>,
    config: DownloaderConfig,
    cancel: CancellationToken,
    mut on_progress: impl FnMut(ProgressSnapshot) + Send + 'static,
) -> FetchResult<DownloadOutcome> {
    let client = build_client(&config)?;

    let probe = if let Some(total) = total_size_hint {
        prober::ProbeResult { total_size: total as i64, supports_range: true }
    } else {
        prober::probe(&client, url, auth_header).await?
    };

    if probe.total_size <= 0 {
        return Err(FetchError::unsupported_media("server did not report a usable Content-Length"));
    }

    if !probe.supports_range {
        let state = ProgressState::new(probe.total_size);
        let ticker_state = state.clone();
        let ticker = spawn_ticker(ticker_state, PROGRESS_SAMPLE_INTERVAL, move |snap| on_progress(snap));
        let result = fallback::download_single_stream(&client, url, auth_header, output_path, &state, cancel.clone()).await;
        state.finish(result.as_ref().err().map(|e| e.to_string())).await;
        let _ = ticker.await;
        return result.map(|total_bytes| DownloadOutcome { total_bytes, used_fallback: true });
    }

    let total = probe.total_size as u64;

    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(output_path)
        .map_err(|e| FetchError::storage(format!("create {}", output_path.display()), e))?;
    // Best-effort pre-allocation; failure is tolerated (sparse-file support varies by filesystem).
    if let Err(e) = file.set_len(total) {
        debug!(error = %e, "pre-allocation failed, continuing without it");
    }
    let file = Arc::new(file);

    let chunks = planner::plan(total, config.chunk_size);
    let state = ProgressState::new(total as i64);

    let (tx, rx) = mpsc::channel::<Chunk>(chunks.len().max(1));
    for chunk in chunks {
        tx.send(chunk).await.ok();
    }
    drop(tx);
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    let ticker_state = state.clone();
    let ticker = spawn_ticker(ticker_state, PROGRESS_SAMPLE_INTERVAL, move |snap| on_progress(snap));

    let mut workers = Vec::with_capacity(config.streams);
    for worker_id in 0..config.streams {
        let client = client.clone();
        let url = url.to_string();
        let auth_header = auth_header.map(|s| s.to_string());
        let file = file.clone();
        let rx = rx.clone();
        let state = state.clone();
        let cancel = cancel.clone();
        let buffer_size = config.buffer_size;

        workers.push(tokio::spawn(async move {
            worker_loop(worker_id, client, url, auth_header, file, rx, state, cancel, buffer_size).await
        }));
    }

    let mut first_error: Option<FetchError> = None;
    for handle in workers {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
            Err(join_err) => {
                if first_error.is_none() {
                    first_error = Some(FetchError::storage(
                        format!("worker panicked: {join_err}"),
                        std::io::Error::other(join_err.to_string()),
                    ));
                }
            }
        }
    }

    state.finish(first_error.as_ref().map(|e| e.to_string())).await;
    let _ = ticker.await;

    match first_error {
        Some(e) => Err(e),
        None => Ok(DownloadOutcome { total_bytes: total, used_fallback: false }),
    }
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop(
    worker_id: usize,
    client: Client,
    url: String,
    auth_header: Option<String>,
    file: Arc<File>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Chunk>>>,
    state: Arc<ProgressState>,
    cancel: CancellationToken,
    buffer_size: usize,
) -> FetchResult<()> {
    loop {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let chunk = {
            let mut guard = rx.lock().await;
            guard.recv().await
        };
        let Some(chunk) = chunk else { return Ok(()) };

        debug!(worker_id, chunk = chunk.index, "claimed chunk");
        download_chunk(&client, &url, auth_header.as_deref(), &file, chunk, &state, &cancel, buffer_size).await?;
    }
}

/// Resumable per-chunk retry loop. Never restarts a chunk from its start;
/// the attempt budget resets on forward progress but is capped by a
/// wall-clock ceiling independent of that reset.
async fn download_chunk(
    client: &Client,
    url: &str,
    auth_header: Option<&str>,
    file: &File,
    chunk: Chunk,
    state: &ProgressState,
    cancel: &CancellationToken,
    buffer_size: usize,
) -> FetchResult<()> {
    let deadline = Instant::now() + CHUNK_WALL_CLOCK_CEILING;
    let mut cursor = chunk.start;
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        if Instant::now() >= deadline {
            return Err(FetchError::transient(
                Some(chunk.index),
                std::io::Error::new(std::io::ErrorKind::TimedOut, "chunk exceeded wall-clock ceiling"),
            ));
        }

        let range_header = format!("bytes={}-{}", cursor, chunk.end);
        let mut req = client.get(url).header(RANGE, range_header);
        if let Some(auth) = auth_header {
            req = req.header(AUTHORIZATION, auth);
        }

        let attempt_result = run_chunk_attempt(req, file, cursor, chunk.end, state, cancel, buffer_size).await;

        match attempt_result {
            Ok(new_cursor) if new_cursor > chunk.end => {
                return Ok(());
            }
            Ok(new_cursor) => {
                // EOF short of end: incomplete, treat as a failed attempt but
                // keep whatever progress was made.
                let made_progress = new_cursor > cursor;
                cursor = new_cursor;
                if made_progress {
                    attempt = 0;
                } else {
                    attempt += 1;
                }
                if attempt >= MAX_CHUNK_ATTEMPTS {
                    return Err(FetchError::transient(
                        Some(chunk.index),
                        std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "chunk incomplete after max attempts"),
                    ));
                }
            }
            Err((new_cursor, err)) => {
                let made_progress = new_cursor > cursor;
                cursor = new_cursor;
                if made_progress {
                    attempt = 0;
                } else {
                    attempt += 1;
                }
                if attempt >= MAX_CHUNK_ATTEMPTS {
                    return Err(FetchError::transient(Some(chunk.index), err));
                }
                warn!(chunk = chunk.index, attempt, error = %err, "chunk attempt failed, retrying");
                let backoff = backoff_delay(attempt);
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                }
            }
        }
    }
}

/// Exponential backoff, `500ms * 2^(attempt-1)`, capped at `CHUNK_RETRY_MAX_DELAY`.
fn backoff_delay(attempt: u32) -> std::time::Duration {
    (CHUNK_RETRY_BASE_DELAY * 2u32.saturating_pow(attempt.saturating_sub(1))).min(CHUNK_RETRY_MAX_DELAY)
}

/// Writes whatever's accumulated in `buf` at `*pos`, clamped so the write
/// never crosses `end`. Returns whether the chunk's range is now fully
/// written.
fn flush_buffer(file: &File, buf: &mut Vec<u8>, pos: &mut u64, end: u64, state: &ProgressState) -> io::Result<bool> {
    if buf.is_empty() {
        return Ok(*pos > end);
    }
    let remaining_allowed = (end + 1 - *pos) as usize;
    let to_write = &buf[..remaining_allowed.min(buf.len())];
    pwrite::write_all_at(file, to_write, *pos)?;
    state.add_bytes(to_write.len() as u64);
    *pos += to_write.len() as u64;
    buf.clear();
    Ok(*pos > end)
}

/// Runs one GET+stream attempt starting at `cursor`. Returns the cursor
/// reached (exclusive end, i.e. one past the last byte written) on success
/// or on clean EOF; returns `(cursor_reached, error)` on a stream error.
/// Network reads are accumulated into a `buffer_size`-sized buffer before
/// each positioned write, rather than issuing one write per network read.
async fn run_chunk_attempt(
    req: reqwest::RequestBuilder,
    file: &File,
    cursor: u64,
    end: u64,
    state: &ProgressState,
    cancel: &CancellationToken,
    buffer_size: usize,
) -> Result<u64, (u64, Box<dyn std::error::Error + Send + Sync>)> {
    let resp = tokio::select! {
        r = req.send() => r.map_err(|e| (cursor, Box::new(e) as Box<dyn std::error::Error + Send + Sync>))?,
        _ = cancel.cancelled() => return Err((cursor, Box::new(io::Error::new(io::ErrorKind::Interrupted, "cancelled")))),
    };

    let status = resp.status();
    let expected_len = end - cursor + 1;
    if status == reqwest::StatusCode::OK {
        // The server ignored Range and is streaming the whole resource from
        // byte 0; that's only safe to treat as this chunk's bytes if the
        // body it's about to send is exactly the requested range length —
        // otherwise writing it at `cursor` would put unrelated file offsets
        // in the wrong place.
        let content_length = resp
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if content_length != Some(expected_len) {
            return Err((
                cursor,
                Box::new(io::Error::other(format!(
                    "server returned 200 without honoring the range (expected {expected_len} bytes)"
                ))),
            ));
        }
    } else if status != reqwest::StatusCode::PARTIAL_CONTENT {
        return Err((cursor, Box::new(io::Error::other(format!("unexpected status {status}")))));
    }

    let mut stream = resp.bytes_stream();
    let mut pos = cursor;
    let mut buf = Vec::with_capacity(buffer_size);

    loop {
        let next = tokio::select! {
            n = stream.next() => n,
            _ = cancel.cancelled() => return Err((pos, Box::new(io::Error::new(io::ErrorKind::Interrupted, "cancelled")))),
        };

        match next {
            Some(Ok(bytes)) if !bytes.is_empty() => {
                buf.extend_from_slice(&bytes);
                if buf.len() >= buffer_size {
                    match flush_buffer(file, &mut buf, &mut pos, end, state) {
                        Ok(true) => return Ok(pos),
                        Ok(false) => {}
                        Err(e) => return Err((pos, Box::new(e))),
                    }
                }
            }
            Some(Ok(_)) => continue, // empty chunk, ignore
            Some(Err(e)) => {
                let _ = flush_buffer(file, &mut buf, &mut pos, end, state);
                return Err((pos, Box::new(e)));
            }
            None => {
                return match flush_buffer(file, &mut buf, &mut pos, end, state) {
                    Ok(_) => Ok(pos), // clean EOF
                    Err(e) => Err((pos, Box::new(e))),
                };
            }
        }
    }
}
