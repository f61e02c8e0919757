//! Single-stream fallback: sequential copy when the server does not
//! honor `Range:` requests. No retry — a mid-stream failure fails the
//! whole job since resume is impossible without range support.

use crate::cancel::CancellationToken;
use crate::config::SINGLE_STREAM_BUFFER_SIZE;
use crate::error::{FetchError, FetchResult};
use crate::progress::ProgressState;
use futures_util::StreamExt;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use std::io::Write;
use std::path::Path;

pub async fn download_single_stream(
    client: &Client,
    url: &str,
    auth_header: Option<&str>,
    output_path: &Path,
    state: &ProgressState,
    cancel: CancellationToken,
) -> FetchResult<u64> {
    let mut req = client.get(url);
    if let Some(auth) = auth_header {
        req = req.header(AUTHORIZATION, auth);
    }

    let resp = req.send().await.map_err(FetchError::from)?;
    if !resp.status().is_success() {
        return Err(FetchError::unsupported_media(format!(
            "single-stream fallback got status {}",
            resp.status()
        )));
    }

    let mut file = std::fs::File::create(output_path)
        .map_err(|e| FetchError::storage(format!("create {}", output_path.display()), e))?;

    let mut stream = resp.bytes_stream();
    let mut buffered = Vec::with_capacity(SINGLE_STREAM_BUFFER_SIZE);
    let mut total: u64 = 0;

    loop {
        let next = tokio::select! {
            n = stream.next() => n,
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
        };
        match next {
            Some(Ok(bytes)) => {
                buffered.extend_from_slice(&bytes);
                if buffered.len() >= SINGLE_STREAM_BUFFER_SIZE {
                    flush_buffer(&mut file, &mut buffered, &mut total, state, output_path)?;
                }
            }
            Some(Err(e)) => return Err(FetchError::transient(None, e)),
            None => break,
        }
    }
    if !buffered.is_empty() {
        flush_buffer(&mut file, &mut buffered, &mut total, state, output_path)?;
    }

    Ok(total)
}

fn flush_buffer(
    file: &mut std::fs::File,
    buffered: &mut Vec<u8>,
    total: &mut u64,
    state: &ProgressState,
    output_path: &Path,
) -> FetchResult<()> {
    file.write_all(buffered)
        .map_err(|e| FetchError::storage(format!("write {}", output_path.display()), e))?;
    state.add_bytes(buffered.len() as u64);
    *total += buffered.len() as u64;
    buffered.clear();
    Ok(())
}
