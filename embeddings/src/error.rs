//! Error types for the embeddings system.

use thiserror::Error;

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Errors that can occur in the embeddings system.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Input cannot be converted to what the backend expects.
    #[error("unsupported input: {0}")]
    UnsupportedInput(String),

    /// Caller supplied an invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The backend failed to produce an embedding.
    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    /// The backend could not be loaded or activated.
    #[error("backend `{name}` unavailable: {reason}")]
    BackendUnavailable { name: String, reason: String },

    /// A backend with this name is already registered.
    #[error("backend `{0}` is already registered")]
    DuplicateBackend(String),

    /// Dimension mismatch.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// API request failed.
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// Invalid response from a remote backend.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Image conversion or encoding error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}
