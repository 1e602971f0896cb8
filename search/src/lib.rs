//! # Image Search
//!
//! This crate exposes natural-language image search as a single session
//! object consumed by a UI layer:
//!
//! - **Backends**: Registered once at startup, one active at a time
//! - **Ingestion**: The ordered set of images to search over
//! - **Search**: Text query in, thresholded top-k images out
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Search Session                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  register_backend ──► BackendRegistry                           │
//! │  ingest ───────────► source images                              │
//! │                           │                                     │
//! │  search(query, backend) ──┼─► switch? ──► VectorCollection      │
//! │                           │                    │                │
//! │                           ▼                    ▼                │
//! │                     embed_text ──────────► rank ──► SearchResult│
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use imgsearch_search::{SearchConfig, SearchSession};
//!
//! let mut session = SearchSession::new(SearchConfig::default())?;
//! session.register_fn_backend("clip", clip_image, clip_text, 512)?;
//! session.ingest(images).await;
//!
//! let results = session.search("a dog on a beach", "clip", 4, 0.2).await?;
//! ```

pub mod config;
pub mod error;
pub mod session;

pub use config::SearchConfig;
pub use error::{Result, SearchError};
pub use session::SearchSession;

// Re-export from dependencies for convenience
pub use imgsearch_embeddings::{
    EmbeddingBackend, FnBackend, HttpBackend, SearchHit, SearchResult, SimilarityMetric,
    SourceImage, VectorCollection,
};
