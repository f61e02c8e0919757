//! Extractor interface and dispatch: URL to extractor, with a host table,
//! a site-config rule hook, and a direct-URL fallback.

use crate::config::MAX_REDIRECTS;
use crate::descriptor::MediaDescriptor;
use crate::error::{FetchError, FetchResult};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;
    fn matches(&self, url: &Url) -> bool;
    async fn extract(&self, url: &str) -> FetchResult<MediaDescriptor>;
}

/// Host normalization: strips a leading `www.` so a registered bare
/// domain matches any subdomain.
fn normalize_host(host: &str) -> String {
    host.strip_prefix("www.").unwrap_or(host).to_lowercase()
}

fn host_matches(pattern: &str, host: &str) -> bool {
    let pattern = normalize_host(pattern);
    let host = normalize_host(host);
    host == pattern || host.ends_with(&format!(".{pattern}"))
}

/// A WebDAV collaborator synthesizes an HTTP URL + Basic auth header from
/// a `remote:/path` shorthand. Only the interface is specified; no
/// concrete implementation ships with this crate.
pub trait RemoteCollaborator: Send + Sync {
    fn resolve(&self, remote_path: &str) -> FetchResult<(String, String)>;
}

/// A site-rules collaborator supplies a browser-automation rule for a
/// host. Only the interface is specified.
pub trait SiteRulesCollaborator: Send + Sync {
    fn rule_for_host(&self, host: &str) -> Option<Arc<dyn Extractor>>;
}

pub struct ExtractorRegistry {
    by_host: HashMap<String, Arc<dyn Extractor>>,
    fallbacks: Vec<Arc<dyn Extractor>>,
    remote: Option<Arc<dyn RemoteCollaborator>>,
    site_rules: Option<Arc<dyn SiteRulesCollaborator>>,
    direct: Arc<DirectExtractor>,
}

impl ExtractorRegistry {
    pub fn new(direct: DirectExtractor) -> Self {
        Self {
            by_host: HashMap::new(),
            fallbacks: Vec::new(),
            remote: None,
            site_rules: None,
            direct: Arc::new(direct),
        }
    }

    pub fn register_host(&mut self, host_pattern: impl Into<String>, extractor: Arc<dyn Extractor>) {
        self.by_host.insert(normalize_host(&host_pattern.into()), extractor);
    }

    pub fn register_fallback(&mut self, extractor: Arc<dyn Extractor>) {
        self.fallbacks.push(extractor);
    }

    pub fn set_remote_collaborator(&mut self, remote: Arc<dyn RemoteCollaborator>) {
        self.remote = Some(remote);
    }

    pub fn set_site_rules(&mut self, rules: Arc<dyn SiteRulesCollaborator>) {
        self.site_rules = Some(rules);
    }

    fn lookup_by_host(&self, host: &str) -> Option<Arc<dyn Extractor>> {
        let normalized = normalize_host(host);
        if let Some(found) = self.by_host.get(&normalized) {
            return Some(found.clone());
        }
        self.by_host
            .iter()
            .find(|(pattern, _)| host_matches(pattern, host))
            .map(|(_, e)| e.clone())
    }

    /// Dispatch policy, first match wins:
    /// 1. `remote:/path` shorthand → WebDAV collaborator.
    /// 2. Registered host extractor.
    /// 3. Site-rules collaborator.
    /// 4. Direct Extractor.
    pub async fn dispatch(&self, input: &str) -> FetchResult<MediaDescriptor> {
        if let Some((scheme, path)) = input.split_once(":/") {
            if !scheme.is_empty() && !scheme.contains('/') && !input.starts_with("http") {
                let remote = self
                    .remote
                    .as_ref()
                    .ok_or(FetchError::NoExtractor)?;
                let (url, auth) = remote.resolve(&format!("{scheme}:/{path}"))?;
                return self.direct.extract_with_auth(&url, Some(&auth)).await;
            }
        }

        let parsed = Url::parse(input).map_err(|_| FetchError::invalid_input(format!("unparseable URL: {input}")))?;
        let host = parsed.host_str().ok_or_else(|| FetchError::invalid_input("URL has no host"))?;

        if let Some(extractor) = self.lookup_by_host(host) {
            return extractor.extract(input).await;
        }

        if let Some(rules) = &self.site_rules {
            if let Some(extractor) = rules.rule_for_host(host) {
                return extractor.extract(input).await;
            }
        }

        for fallback in &self.fallbacks {
            if fallback.matches(&parsed) {
                return fallback.extract(input).await;
            }
        }

        self.direct.extract(input).await
    }
}

/// HEAD against the URL, resolves Content-Type and final URL after
/// redirects (capped at 10), classifies as video/audio/image by MIME, and
/// produces a single-format descriptor with filename drawn from the URL
/// path.
pub struct DirectExtractor {
    client: Client,
}

impl DirectExtractor {
    pub fn new() -> FetchResult<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(FetchError::from)?;
        Ok(Self { client })
    }

    async fn extract_with_auth(&self, url: &str, auth_header: Option<&str>) -> FetchResult<MediaDescriptor> {
        let mut req = self.client.head(url);
        if let Some(auth) = auth_header {
            req = req.header(reqwest::header::AUTHORIZATION, auth);
        }
        let resp = req.send().await.map_err(FetchError::from)?;
        let final_url = resp.url().to_string();

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let path = Url::parse(&final_url).ok().and_then(|u| {
            u.path_segments().and_then(|mut segs| segs.next_back().map(str::to_string))
        });
        let filename = path.unwrap_or_else(|| "download".to_string());
        let ext = filename
            .rsplit_once('.')
            .map(|(_, e)| e.to_lowercase())
            .unwrap_or_else(|| extension_from_mime(&content_type).to_string());
        let title = filename
            .rsplit_once('.')
            .map(|(stem, _)| stem.to_string())
            .unwrap_or(filename.clone());

        let mut headers = HashMap::new();
        if let Some(auth) = auth_header {
            headers.insert("Authorization".to_string(), auth.to_string());
        }

        if content_type.starts_with("video/") {
            MediaDescriptor::video(
                &final_url,
                title,
                vec![crate::descriptor::VideoFormat {
                    url: final_url.clone(),
                    ext,
                    quality: "source".to_string(),
                    width: None,
                    height: None,
                    bitrate: 0,
                    headers,
                    audio_url: None,
                }],
            )
            .map_err(|e| FetchError::unsupported_media(e.to_string()))
        } else if content_type.starts_with("audio/") {
            MediaDescriptor::audio(&final_url, title, final_url.clone(), ext)
                .map_err(|e| FetchError::unsupported_media(e.to_string()))
        } else if content_type.starts_with("image/") {
            MediaDescriptor::images(
                &final_url,
                title,
                vec![crate::descriptor::ImageItem { url: final_url.clone(), ext, width: None, height: None }],
            )
            .map_err(|e| FetchError::unsupported_media(e.to_string()))
        } else {
            Err(FetchError::unsupported_media(format!(
                "direct extractor cannot classify content-type {content_type}"
            )))
        }
    }
}

#[async_trait]
impl Extractor for DirectExtractor {
    fn name(&self) -> &str {
        "direct"
    }

    fn matches(&self, _url: &Url) -> bool {
        true
    }

    async fn extract(&self, url: &str) -> FetchResult<MediaDescriptor> {
        self.extract_with_auth(url, None).await
    }
}

/// Inert demonstration extractor: registered under a host pattern purely to
/// exercise dispatch ordering against a registered host beating the Direct
/// fallback. It never touches the network and always reports
/// `ExtractorFailure`; it makes no claim to implement any real site's
/// scraping.
pub struct DemoHostExtractor {
    name: &'static str,
}

impl DemoHostExtractor {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl Extractor for DemoHostExtractor {
    fn name(&self) -> &str {
        self.name
    }

    fn matches(&self, _url: &Url) -> bool {
        true
    }

    async fn extract(&self, _url: &str) -> FetchResult<MediaDescriptor> {
        Err(FetchError::extractor_failure(format!(
            "{} is a demonstration extractor; no real scraping is implemented",
            self.name
        )))
    }
}

fn extension_from_mime(mime: &str) -> &'static str {
    match mime {
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "audio/mpeg" => "mp3",
        "audio/mp4" => "m4a",
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_matches_exact_and_subdomain() {
        assert!(host_matches("example.com", "example.com"));
        assert!(host_matches("example.com", "cdn.example.com"));
        assert!(host_matches("example.com", "www.example.com"));
        assert!(!host_matches("example.com", "notexample.com"));
    }

    /// A URL matching a registered host dispatches to that extractor
    /// rather than falling through to Direct.
    #[tokio::test]
    async fn registered_host_extractor_wins_over_direct_fallback() {
        let mut registry = ExtractorRegistry::new(DirectExtractor::new().unwrap());
        registry.register_host("x.com", Arc::new(DemoHostExtractor::new("demo-x")));

        let err = registry.dispatch("https://x.com/u/status/1").await.unwrap_err();
        assert!(matches!(err, FetchError::ExtractorFailure { .. }));
        assert!(err.to_string().contains("demo-x"));
    }
}
