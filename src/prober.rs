//! Range prober: determines file size and whether a server honors
//! `Range:` requests, probing with a small ranged GET before falling
//! back to a plain HEAD.

use crate::config::PROBE_TIMEOUT;
use crate::error::{FetchError, FetchResult};
use reqwest::header::{ACCEPT_RANGES, AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::{Client, StatusCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub total_size: i64,
    pub supports_range: bool,
}

/// Parses `bytes START-END/TOTAL`, returning `TOTAL`.
fn parse_content_range_total(value: &str) -> Option<i64> {
    let rest = value.strip_prefix("bytes ")?;
    let (_range, total) = rest.split_once('/')?;
    if total == "*" {
        return None;
    }
    total.parse::<i64>().ok()
}

pub async fn probe(client: &Client, url: &str, auth_header: Option<&str>) -> FetchResult<ProbeResult> {
    let mut req = client
        .get(url)
        .timeout(PROBE_TIMEOUT)
        .header(RANGE, "bytes=0-1");
    if let Some(auth) = auth_header {
        req = req.header(AUTHORIZATION, auth);
    }

    let resp = req.send().await.map_err(FetchError::from)?;

    match resp.status() {
        StatusCode::PARTIAL_CONTENT => {
            let total = resp
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_content_range_total);
            // Drain and discard the probe body regardless of outcome.
            let _ = resp.bytes().await;
            match total {
                Some(total) => Ok(ProbeResult { total_size: total, supports_range: true }),
                None => probe_via_head(client, url, auth_header).await,
            }
        }
        StatusCode::OK => {
            let total = resp
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(-1);
            let _ = resp.bytes().await;
            Ok(ProbeResult { total_size: total, supports_range: false })
        }
        StatusCode::RANGE_NOT_SATISFIABLE => probe_via_head(client, url, auth_header).await,
        other => Err(FetchError::unsupported_media(format!(
            "unexpected probe status {other} for {url}"
        ))),
    }
}

async fn probe_via_head(client: &Client, url: &str, auth_header: Option<&str>) -> FetchResult<ProbeResult> {
    let mut req = client.head(url).timeout(PROBE_TIMEOUT);
    if let Some(auth) = auth_header {
        req = req.header(AUTHORIZATION, auth);
    }
    let resp = req.send().await.map_err(FetchError::from)?;

    let total = resp
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(-1);
    let supports_range = resp
        .headers()
        .get(ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "bytes")
        .unwrap_or(false);

    Ok(ProbeResult { total_size: total, supports_range })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_range_total() {
        assert_eq!(parse_content_range_total("bytes 0-1/104857600"), Some(104857600));
        assert_eq!(parse_content_range_total("bytes 0-1/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }
}
