//! End-to-end scenarios against a real local HTTP server.

use mediafetch::cancel::CancellationToken;
use mediafetch::config::DownloaderConfig;
use mediafetch::downloader;
use sha2::{Digest, Sha256};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn make_body(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn happy_path_multi_stream_matches_source_bytes() {
    let total = 2 * 1024 * 1024; // kept small for test speed
    let body = make_body(total);
    let server = MockServer::start().await;

    let digest_expected = {
        let mut hasher = Sha256::new();
        hasher.update(&body);
        hasher.finalize()
    };

    Mock::given(method("GET"))
        .and(path("/file.bin"))
        .and(header("range", "bytes=0-1"))
        .respond_with(move |_req: &wiremock::Request| {
            ResponseTemplate::new(206)
                .insert_header("Content-Range", format!("bytes 0-1/{total}"))
                .set_body_bytes(vec![0u8, 0u8])
        })
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let body_for_ranges = body.clone();
    Mock::given(method("GET"))
        .and(path("/file.bin"))
        .respond_with(move |req: &wiremock::Request| {
            let range = req.headers.get("range").unwrap().to_str().unwrap();
            let spec = range.strip_prefix("bytes=").unwrap();
            let (start, end) = spec.split_once('-').unwrap();
            let start: usize = start.parse().unwrap();
            let end: usize = end.parse().unwrap();
            let slice = &body_for_ranges[start..=end.min(body_for_ranges.len() - 1)];
            ResponseTemplate::new(206)
                .insert_header("Content-Range", format!("bytes {start}-{end}/{total}"))
                .set_body_bytes(slice.to_vec())
        })
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("out.bin");
    let url = format!("{}/file.bin", server.uri());

    let config = DownloaderConfig { streams: 4, chunk_size: 256 * 1024, ..Default::default() };
    let outcome = downloader::download(&url, &out_path, config, CancellationToken::new(), |_| {})
        .await
        .expect("download should succeed");

    assert_eq!(outcome.total_bytes, total as u64);
    assert!(!outcome.used_fallback);

    let written = std::fs::read(&out_path).unwrap();
    assert_eq!(written.len(), total);
    let mut hasher = Sha256::new();
    hasher.update(&written);
    assert_eq!(hasher.finalize(), digest_expected);
}

#[tokio::test]
async fn no_range_server_falls_back_to_single_stream() {
    let total = 256 * 1024;
    let body = make_body(total);
    let server = MockServer::start().await;

    let body_clone = body.clone();
    Mock::given(method("GET"))
        .and(path("/plain.bin"))
        .respond_with(move |_req: &wiremock::Request| {
            ResponseTemplate::new(200).set_body_bytes(body_clone.clone())
        })
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("plain.bin");
    let url = format!("{}/plain.bin", server.uri());

    let outcome = downloader::download(&url, &out_path, DownloaderConfig::default(), CancellationToken::new(), |_| {})
        .await
        .expect("fallback download should succeed");

    assert!(outcome.used_fallback);
    let written = std::fs::read(&out_path).unwrap();
    assert_eq!(written, body);
}

#[tokio::test]
async fn cancellation_stops_the_download() {
    let total = 8 * 1024 * 1024;
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow.bin"))
        .and(header("range", "bytes=0-1"))
        .respond_with(ResponseTemplate::new(206).insert_header("Content-Range", format!("bytes 0-1/{total}")).set_body_bytes(vec![0u8; 2]))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/slow.bin"))
        .respond_with(move |req: &wiremock::Request| {
            let range = req.headers.get("range").unwrap().to_str().unwrap();
            let spec = range.strip_prefix("bytes=").unwrap();
            let (start, end) = spec.split_once('-').unwrap();
            let start: usize = start.parse().unwrap();
            let end: usize = end.parse().unwrap();
            let len = end - start + 1;
            ResponseTemplate::new(206)
                .insert_header("Content-Range", format!("bytes {start}-{end}/{total}"))
                .set_delay(std::time::Duration::from_millis(200))
                .set_body_bytes(vec![0u8; len])
        })
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("slow.bin");
    let url = format!("{}/slow.bin", server.uri());

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel_clone.cancel();
    });

    let config = DownloaderConfig { streams: 2, chunk_size: 1024 * 1024, ..Default::default() };
    let result = downloader::download(&url, &out_path, config, cancel, |_| {}).await;
    assert!(result.is_err());
    assert!(matches!(result.unwrap_err(), mediafetch::error::FetchError::Cancelled));
}
