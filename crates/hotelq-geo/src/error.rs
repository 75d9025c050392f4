use hotelq_core::EmbedError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Embed(#[from] EmbedError),

    /// The upstream region/subregion source failed.
    #[error("geo source error: {0}")]
    Source(String),

    /// A persisted artifact exists but does not decode or does not line up
    /// with its siblings.
    #[error("corrupt cache artifact {artifact}: {reason}")]
    Corrupt { artifact: String, reason: String },

    /// The persisted cache was built for a different embedder or format.
    #[error("cache manifest mismatch: {0}")]
    ManifestMismatch(String),

    #[error("geo cache is not initialized")]
    NotInitialized,
}

impl GeoError {
    pub(crate) fn corrupt(artifact: &str, reason: impl Into<String>) -> Self {
        Self::Corrupt { artifact: artifact.to_string(), reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, GeoError>;
