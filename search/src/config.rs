//! Configuration for the search session.

use imgsearch_embeddings::SimilarityMetric;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

/// Configuration for the search session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of results returned by `search_with_defaults`.
    pub default_k: usize,

    /// Exclusive minimum score used by `search_with_defaults`.
    pub default_threshold: f32,

    /// How query and image embeddings are compared.
    pub metric: SimilarityMetric,

    /// Maximum cached query vectors; 0 disables the cache.
    pub query_cache_entries: usize,
}

impl SearchConfig {
    /// Parse a configuration from TOML. Missing keys take their defaults.
    ///
    /// ```toml
    /// default_k = 8
    /// default_threshold = 0.2
    /// metric = "cosine"
    /// ```
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the default result count.
    pub fn with_default_k(mut self, k: usize) -> Self {
        self.default_k = k;
        self
    }

    /// Set the default threshold.
    pub fn with_default_threshold(mut self, threshold: f32) -> Self {
        self.default_threshold = threshold;
        self
    }

    /// Set the similarity metric.
    pub fn with_metric(mut self, metric: SimilarityMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Set the query cache capacity.
    pub fn with_query_cache_entries(mut self, entries: usize) -> Self {
        self.query_cache_entries = entries;
        self
    }

    /// Reject values `search` would refuse anyway.
    pub fn validate(&self) -> Result<()> {
        if self.default_k == 0 {
            return Err(SearchError::Config(
                "default_k must be at least 1".to_string(),
            ));
        }
        if self.default_threshold.is_nan() {
            return Err(SearchError::Config(
                "default_threshold must be a number".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_k: 4,
            default_threshold: 0.0,
            metric: SimilarityMetric::DotProduct,
            query_cache_entries: 256,
        }
    }
}
