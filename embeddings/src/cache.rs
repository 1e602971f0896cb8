//! Query embedding cache.
//!
//! Text embeddings are deterministic per backend, so a repeated query can
//! reuse its vector instead of running the model again.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::Embedding;

#[derive(Debug, Clone)]
struct CacheEntry {
    embedding: Embedding,
    /// Insertion sequence number, used for eviction.
    inserted: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<(String, String), CacheEntry>,
    next_seq: u64,
}

/// Bounded in-memory cache of query vectors keyed by backend and text.
pub struct QueryCache {
    state: RwLock<CacheState>,
    max_entries: usize,
}

impl QueryCache {
    /// Create a cache holding at most `max_entries` vectors.
    pub fn new(max_entries: usize) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            max_entries,
        }
    }

    /// Get a cached query vector.
    pub async fn get(&self, backend: &str, text: &str) -> Option<Embedding> {
        let state = self.state.read().await;
        state
            .entries
            .get(&(backend.to_string(), text.to_string()))
            .map(|e| e.embedding.clone())
    }

    /// Cache a query vector, evicting the oldest entry when full.
    pub async fn put(&self, backend: &str, text: &str, embedding: Embedding) {
        if self.max_entries == 0 {
            return;
        }

        let mut state = self.state.write().await;
        let key = (backend.to_string(), text.to_string());

        if !state.entries.contains_key(&key) && state.entries.len() >= self.max_entries {
            if let Some(oldest_key) = state
                .entries
                .iter()
                .min_by_key(|(_, v)| v.inserted)
                .map(|(k, _)| k.clone())
            {
                debug!("Evicting cached query for backend {}", oldest_key.0);
                state.entries.remove(&oldest_key);
            }
        }

        let inserted = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(key, CacheEntry { embedding, inserted });
        debug!("Cached query embedding (backend: {backend})");
    }

    /// Check if a query vector is cached.
    pub async fn contains(&self, backend: &str, text: &str) -> bool {
        self.state
            .read()
            .await
            .entries
            .contains_key(&(backend.to_string(), text.to_string()))
    }

    /// Clear the entire cache.
    pub async fn clear(&self) {
        self.state.write().await.entries.clear();
        info!("Cleared query embedding cache");
    }

    /// Get cache statistics.
    pub async fn stats(&self) -> CacheStats {
        let state = self.state.read().await;
        let mut backends: Vec<String> = state
            .entries
            .keys()
            .map(|(backend, _)| backend.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        backends.sort();

        CacheStats {
            entries: state.entries.len(),
            max_entries: self.max_entries,
            backends,
        }
    }
}

/// Statistics about the query cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of entries in cache.
    pub entries: usize,

    /// Maximum cache size.
    pub max_entries: usize,

    /// Backends with cached queries, sorted.
    pub backends: Vec<String>,
}
