//! Registry of named embedding backends.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::error::{EmbeddingError, Result};
use crate::provider::{EmbeddingBackend, FnBackend};
use crate::{Embedding, SourceImage};

/// Named embedding backends available to a search session.
///
/// Backends are immutable once registered; a name can only be taken once.
#[derive(Default)]
pub struct BackendRegistry {
    backends: BTreeMap<String, Arc<dyn EmbeddingBackend>>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under its own name.
    pub fn register(&mut self, backend: Arc<dyn EmbeddingBackend>) -> Result<()> {
        let name = backend.name().to_string();
        if self.backends.contains_key(&name) {
            return Err(EmbeddingError::DuplicateBackend(name));
        }

        info!(
            "Registered embedding backend {name} ({} dimensions)",
            backend.dimension()
        );
        self.backends.insert(name, backend);
        Ok(())
    }

    /// Register a backend built from two embedding functions.
    pub fn register_fn<I, T>(
        &mut self,
        name: impl Into<String>,
        embed_image: I,
        embed_text: T,
        dimension: usize,
    ) -> Result<()>
    where
        I: Fn(&SourceImage) -> Result<Embedding> + Send + Sync + 'static,
        T: Fn(&str) -> Result<Embedding> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnBackend::new(name, embed_image, embed_text, dimension)))
    }

    /// Look up a backend by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn EmbeddingBackend>> {
        self.backends.get(name).cloned()
    }

    /// Check if a backend is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
