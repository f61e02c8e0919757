//! Typed error taxonomy for the fetch pipeline.

use thiserror::Error;

/// One variant per error kind the pipeline distinguishes. `chunk_index` is
/// populated only for errors raised while servicing a specific chunk.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("no extractor registered for this URL")]
    NoExtractor,

    #[error("extractor failed: {message}")]
    ExtractorFailure { message: String },

    #[error("transient network error{}: {source}", chunk_index.map(|i| format!(" (chunk {i})")).unwrap_or_default())]
    TransientNetwork {
        chunk_index: Option<usize>,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("unsupported media: {message}")]
    UnsupportedMedia { message: String },

    #[error("storage failure: {message}")]
    StorageFailure {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput { message: message.into() }
    }

    pub fn extractor_failure(message: impl Into<String>) -> Self {
        Self::ExtractorFailure { message: message.into() }
    }

    pub fn unsupported_media(message: impl Into<String>) -> Self {
        Self::UnsupportedMedia { message: message.into() }
    }

    pub fn storage(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::StorageFailure { message: message.into(), source: Some(source) }
    }

    pub fn transient(chunk_index: Option<usize>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::TransientNetwork { chunk_index, source: Box::new(source) }
    }

    /// The error kind as a stable string, used in job records and HTTP responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "invalid_input",
            Self::NoExtractor => "no_extractor",
            Self::ExtractorFailure { .. } => "extractor_failure",
            Self::TransientNetwork { .. } => "transient_network",
            Self::UnsupportedMedia { .. } => "unsupported_media",
            Self::StorageFailure { .. } => "storage_failure",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        Self::transient(None, err)
    }
}

impl From<url::ParseError> for FetchError {
    fn from(err: url::ParseError) -> Self {
        Self::invalid_input(err.to_string())
    }
}

pub type FetchResult<T> = Result<T, FetchError>;
