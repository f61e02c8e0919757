//! Extractor dispatch ordering: a URL matching a registered host dispatches
//! there; an unregistered host falls through to the Direct Extractor, which
//! classifies by Content-Type.

use mediafetch::descriptor::MediaDescriptor;
use mediafetch::error::FetchError;
use mediafetch::extractor::{DemoHostExtractor, DirectExtractor, ExtractorRegistry};
use std::sync::Arc;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn registered_host_dispatches_away_from_direct() {
    let mut registry = ExtractorRegistry::new(DirectExtractor::new().unwrap());
    registry.register_host("x.com", Arc::new(DemoHostExtractor::new("demo-x")));

    let err = registry.dispatch("https://x.com/u/status/1").await.unwrap_err();
    assert!(matches!(err, FetchError::ExtractorFailure { .. }));
}

#[tokio::test]
async fn unregistered_host_falls_through_to_direct_and_classifies_by_mime() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200).insert_header("Content-Type", "video/mp4"))
        .mount(&server)
        .await;

    let mut registry = ExtractorRegistry::new(DirectExtractor::new().unwrap());
    registry.register_host("x.com", Arc::new(DemoHostExtractor::new("demo-x")));

    let url = format!("{}/a.mp4", server.uri());
    let descriptor = registry.dispatch(&url).await.expect("direct extractor should classify this as video");
    match descriptor {
        MediaDescriptor::Video { formats, .. } => {
            assert_eq!(formats.len(), 1);
            assert_eq!(formats[0].ext, "mp4");
        }
        other => panic!("expected Video descriptor, got {other:?}"),
    }
}
