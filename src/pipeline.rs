//! Descriptor post-processing and dispatch-to-download glue: picks the best
//! format out of a descriptor and resolves it to a downloader-ready URL and
//! output path.

use crate::descriptor::{MediaDescriptor, VideoFormat};
use crate::error::{FetchError, FetchResult};
use crate::extractor::ExtractorRegistry;
use crate::filename;

/// One resolved candidate ready for the downloader: its URL, optional
/// per-request headers, and the extension used for filename resolution.
#[derive(Debug, Clone)]
pub struct SelectedFormat {
    pub url: String,
    pub ext: String,
    pub headers: std::collections::HashMap<String, String>,
}

/// Video with multiple formats: prefer any format carrying a non-empty
/// separate audio URL, tie-broken by highest bitrate; otherwise highest
/// bitrate wins outright. Audio/Image descriptors have a single candidate.
pub fn select_format(descriptor: &MediaDescriptor) -> FetchResult<SelectedFormat> {
    match descriptor {
        MediaDescriptor::Video { formats, .. } => {
            if formats.is_empty() {
                return Err(FetchError::unsupported_media("video descriptor has no formats"));
            }
            let with_audio: Vec<&VideoFormat> = formats.iter().filter(|f| f.audio_url.as_deref().is_some_and(|a| !a.is_empty())).collect();
            let pool: Vec<&VideoFormat> = if with_audio.is_empty() { formats.iter().collect() } else { with_audio };
            let best = pool
                .into_iter()
                .max_by_key(|f| f.bitrate)
                .expect("pool is non-empty");
            Ok(SelectedFormat { url: best.url.clone(), ext: best.ext.clone(), headers: best.headers.clone() })
        }
        MediaDescriptor::Audio { url, ext, .. } => {
            Ok(SelectedFormat { url: url.clone(), ext: ext.clone(), headers: Default::default() })
        }
        MediaDescriptor::Images { items, .. } => {
            let first = items.first().ok_or_else(|| FetchError::unsupported_media("images descriptor has no items"))?;
            Ok(SelectedFormat { url: first.url.clone(), ext: first.ext.clone(), headers: Default::default() })
        }
    }
}

/// Full pipeline: dispatch → select format → resolve output path. Returns
/// the resolved format plus the path the downloader should write to.
pub async fn resolve(
    registry: &ExtractorRegistry,
    url: &str,
    output_dir: &std::path::Path,
    caller_filename: Option<&str>,
) -> FetchResult<(SelectedFormat, std::path::PathBuf)> {
    let descriptor = registry.dispatch(url).await?;
    let selected = select_format(&descriptor)?;
    let path = filename::resolve_output_path(output_dir, caller_filename, descriptor.title(), descriptor.id(), &selected.ext);
    Ok((selected, path))
}
