//! # Embeddings
//!
//! This crate provides the embedding side of natural-language image search:
//! interchangeable embedding backends, the in-memory vector collection built
//! from a set of images, and similarity ranking of that collection against a
//! text query.
//!
//! ## Features
//!
//! - **Pluggable Backends**: Any image/text model pair behind one trait, from
//!   plain closures or a remote embedding endpoint
//! - **Vector Collection**: Ordered, immutable, rebuilt in full per backend
//! - **Similarity Ranking**: Thresholded, deterministic top-k by dot product
//! - **Query Cache**: Reuse of query vectors for repeated searches
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  BackendRegistry ──► EmbeddingBackend ──► VectorCollection     │
//! │                            │                    │               │
//! │                            ▼                    ▼               │
//! │                       QueryCache           rank ──► SearchResult│
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod collection;
pub mod error;
pub mod provider;
pub mod registry;
pub mod similarity;

pub use cache::{CacheStats, QueryCache};
pub use collection::{CollectionItem, ItemOutcome, SkippedItem, VectorCollection};
pub use error::{EmbeddingError, Result};
pub use provider::{EmbeddingBackend, FnBackend, HttpBackend, check_dimension};
pub use registry::BackendRegistry;
pub use similarity::{SearchHit, SearchResult, SimilarityMetric, rank};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

/// A decoded source bitmap. Backends normalize size and channel layout
/// themselves.
pub type SourceImage = image::DynamicImage;
