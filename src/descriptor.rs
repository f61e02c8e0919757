//! Media descriptor model: a tagged-variant result type describing how
//! to fetch one or more byte streams for a piece of media.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoFormat {
    pub url: String,
    pub ext: String,
    pub quality: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bitrate: u64,
    pub headers: HashMap<String, String>,
    pub audio_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageItem {
    pub url: String,
    pub ext: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MediaDescriptor {
    Video { id: String, title: String, formats: Vec<VideoFormat> },
    Audio { id: String, title: String, url: String, ext: String },
    Images { id: String, title: String, items: Vec<ImageItem> },
}

#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("video descriptor requires at least one format")]
    NoVideoFormats,
    #[error("images descriptor requires at least one item")]
    NoImageItems,
    #[error("url is not absolute http(s): {0}")]
    NonAbsoluteUrl(String),
    #[error("extension must be lowercase with no leading dot: {0}")]
    BadExtension(String),
}

fn check_url(url: &str) -> Result<(), DescriptorError> {
    let parsed = url::Url::parse(url).map_err(|_| DescriptorError::NonAbsoluteUrl(url.to_string()))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(DescriptorError::NonAbsoluteUrl(url.to_string()));
    }
    Ok(())
}

fn check_ext(ext: &str) -> Result<(), DescriptorError> {
    if ext.starts_with('.') || ext != ext.to_lowercase() || ext.is_empty() {
        return Err(DescriptorError::BadExtension(ext.to_string()));
    }
    Ok(())
}

impl MediaDescriptor {
    pub fn video(id: impl Into<String>, title: impl Into<String>, formats: Vec<VideoFormat>) -> Result<Self, DescriptorError> {
        if formats.is_empty() {
            return Err(DescriptorError::NoVideoFormats);
        }
        for f in &formats {
            check_url(&f.url)?;
            check_ext(&f.ext)?;
        }
        Ok(Self::Video { id: id.into(), title: title.into(), formats })
    }

    pub fn audio(id: impl Into<String>, title: impl Into<String>, url: impl Into<String>, ext: impl Into<String>) -> Result<Self, DescriptorError> {
        let url = url.into();
        let ext = ext.into();
        check_url(&url)?;
        check_ext(&ext)?;
        Ok(Self::Audio { id: id.into(), title: title.into(), url, ext })
    }

    pub fn images(id: impl Into<String>, title: impl Into<String>, items: Vec<ImageItem>) -> Result<Self, DescriptorError> {
        if items.is_empty() {
            return Err(DescriptorError::NoImageItems);
        }
        for i in &items {
            check_url(&i.url)?;
            check_ext(&i.ext)?;
        }
        Ok(Self::Images { id: id.into(), title: title.into(), items })
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Video { id, .. } | Self::Audio { id, .. } | Self::Images { id, .. } => id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Video { title, .. } | Self::Audio { title, .. } | Self::Images { title, .. } => title,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_requires_at_least_one_format() {
        let err = MediaDescriptor::video("id1", "title", vec![]);
        assert!(matches!(err, Err(DescriptorError::NoVideoFormats)));
    }

    #[test]
    fn rejects_uppercase_extension() {
        let formats = vec![VideoFormat {
            url: "https://example.com/a.mp4".into(),
            ext: "MP4".into(),
            quality: "1080p".into(),
            width: Some(1920),
            height: Some(1080),
            bitrate: 5000,
            headers: HashMap::new(),
            audio_url: None,
        }];
        let err = MediaDescriptor::video("id1", "title", formats);
        assert!(matches!(err, Err(DescriptorError::BadExtension(_))));
    }

    #[test]
    fn rejects_non_http_scheme() {
        let err = MediaDescriptor::audio("id1", "title", "ftp://example.com/a.mp3", "mp3");
        assert!(matches!(err, Err(DescriptorError::NonAbsoluteUrl(_))));
    }
}
