//! Error types for the search session.

use imgsearch_embeddings::EmbeddingError;
use thiserror::Error;

/// Result type alias for search operations.
pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors that can occur while searching.
#[derive(Error, Debug)]
pub enum SearchError {
    /// Caller supplied an invalid `k`, threshold or config value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Input could not be converted for the backend.
    #[error("unsupported input: {0}")]
    UnsupportedInput(String),

    /// The query itself could not be embedded.
    #[error("failed to embed query with backend `{backend}`: {source}")]
    EmbeddingFailed {
        backend: String,
        #[source]
        source: EmbeddingError,
    },

    /// The requested backend could not be activated. The previously active
    /// backend and collection are still in place.
    #[error("backend `{backend}` unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    /// Configuration could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Any other embedding error.
    #[error("embedding error: {0}")]
    Embedding(#[source] EmbeddingError),
}

impl From<EmbeddingError> for SearchError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::InvalidArgument(message) => SearchError::InvalidArgument(message),
            EmbeddingError::UnsupportedInput(message) => SearchError::UnsupportedInput(message),
            EmbeddingError::BackendUnavailable { name, reason } => {
                SearchError::BackendUnavailable {
                    backend: name,
                    reason,
                }
            }
            other => SearchError::Embedding(other),
        }
    }
}

impl From<toml::de::Error> for SearchError {
    fn from(err: toml::de::Error) -> Self {
        SearchError::Config(err.to_string())
    }
}
