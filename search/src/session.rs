//! Search session implementation.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use imgsearch_embeddings::{
    BackendRegistry, CacheStats, Embedding, EmbeddingBackend, EmbeddingError, QueryCache,
    SearchResult, SourceImage, VectorCollection, check_dimension, rank,
};

use crate::config::SearchConfig;
use crate::error::{Result, SearchError};

/// The backend currently answering queries and the collection it built.
struct ActiveContext {
    backend: Arc<dyn EmbeddingBackend>,
    collection: Arc<VectorCollection>,
}

/// Single search context over a fixed set of ingested images.
///
/// The session owns the registered backends, the ingested images and the
/// active backend with its collection. Asking for a different backend
/// rebuilds the collection in full before the query is answered.
///
/// Concurrent searches against the active backend share one immutable
/// collection. Switches are serialized; until a switch finishes, readers
/// keep seeing the previous collection.
pub struct SearchSession {
    /// Configuration.
    config: SearchConfig,

    /// Registered backends.
    registry: BackendRegistry,

    /// Ingested images, in ingestion order.
    source: Vec<Arc<SourceImage>>,

    /// Active backend and collection.
    active: RwLock<Option<Arc<ActiveContext>>>,

    /// Held for the duration of a backend switch.
    switch_lock: Mutex<()>,

    /// Cached query vectors.
    query_cache: QueryCache,
}

impl SearchSession {
    /// Create a session with no backends and no images.
    pub fn new(config: SearchConfig) -> Result<Self> {
        config.validate()?;

        let query_cache = QueryCache::new(config.query_cache_entries);
        Ok(Self {
            config,
            registry: BackendRegistry::new(),
            source: Vec::new(),
            active: RwLock::new(None),
            switch_lock: Mutex::new(()),
            query_cache,
        })
    }

    /// Register a backend under its own name.
    pub fn register_backend(&mut self, backend: Arc<dyn EmbeddingBackend>) -> Result<()> {
        self.registry.register(backend)?;
        Ok(())
    }

    /// Register a backend built from two embedding functions.
    pub fn register_fn_backend<I, T>(
        &mut self,
        name: impl Into<String>,
        embed_image: I,
        embed_text: T,
        dimension: usize,
    ) -> Result<()>
    where
        I: Fn(&SourceImage) -> imgsearch_embeddings::Result<Embedding> + Send + Sync + 'static,
        T: Fn(&str) -> imgsearch_embeddings::Result<Embedding> + Send + Sync + 'static,
    {
        self.registry
            .register_fn(name, embed_image, embed_text, dimension)?;
        Ok(())
    }

    /// Supply the images to search over, replacing any earlier ones.
    ///
    /// If a backend is already active its collection is rebuilt in full.
    /// Returns the number of images ingested.
    pub async fn ingest<I>(&mut self, items: I) -> usize
    where
        I: IntoIterator<Item = SourceImage>,
    {
        self.source = items.into_iter().map(Arc::new).collect();
        info!("Ingested {} images", self.source.len());

        if let Some(context) = self.active.get_mut() {
            let collection = build_collection(&self.source, context.backend.as_ref()).await;
            *context = Arc::new(ActiveContext {
                backend: Arc::clone(&context.backend),
                collection,
            });
        }

        self.source.len()
    }

    /// Make `backend_name` the active backend, rebuilding the collection.
    ///
    /// A no-op when the backend is already active. On failure the previous
    /// backend and collection stay active.
    pub async fn activate(&self, backend_name: &str) -> Result<Arc<VectorCollection>> {
        let context = self.switch_to(backend_name).await?;
        Ok(Arc::clone(&context.collection))
    }

    /// Rank the ingested images against a text query.
    ///
    /// Switches to `backend_name` first if it is not the active backend.
    pub async fn search(
        &self,
        query_text: &str,
        backend_name: &str,
        k: usize,
        threshold: f32,
    ) -> Result<SearchResult> {
        validate_request(k, threshold)?;

        let context = self.switch_to(backend_name).await?;
        let query = self.embed_query(&context, query_text).await?;

        let result = rank(
            &query,
            &context.collection,
            k,
            threshold,
            self.config.metric,
        )?;

        debug!(
            "Query {query_text:?} on {backend_name}: {} hits (k={k}, threshold={threshold})",
            result.len()
        );

        Ok(result)
    }

    /// Search with the configured default `k` and threshold.
    pub async fn search_with_defaults(
        &self,
        query_text: &str,
        backend_name: &str,
    ) -> Result<SearchResult> {
        self.search(
            query_text,
            backend_name,
            self.config.default_k,
            self.config.default_threshold,
        )
        .await
    }

    /// Name of the active backend, if any.
    pub async fn active_backend(&self) -> Option<String> {
        self.active
            .read()
            .await
            .as_ref()
            .map(|context| context.backend.name().to_string())
    }

    /// The active collection, if any.
    pub async fn collection(&self) -> Option<Arc<VectorCollection>> {
        self.active
            .read()
            .await
            .as_ref()
            .map(|context| Arc::clone(&context.collection))
    }

    /// Registered backend names, sorted.
    pub fn backend_names(&self) -> Vec<&str> {
        self.registry.names()
    }

    /// Number of ingested images, embedded or not.
    pub fn item_count(&self) -> usize {
        self.source.len()
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.query_cache.stats().await
    }

    async fn current_for(&self, backend_name: &str) -> Option<Arc<ActiveContext>> {
        self.active
            .read()
            .await
            .as_ref()
            .filter(|context| context.backend.name() == backend_name)
            .cloned()
    }

    async fn switch_to(&self, backend_name: &str) -> Result<Arc<ActiveContext>> {
        if let Some(context) = self.current_for(backend_name).await {
            return Ok(context);
        }

        let _guard = self.switch_lock.lock().await;

        // Another caller may have completed this switch while we waited.
        if let Some(context) = self.current_for(backend_name).await {
            return Ok(context);
        }

        let backend =
            self.registry
                .get(backend_name)
                .ok_or_else(|| SearchError::BackendUnavailable {
                    backend: backend_name.to_string(),
                    reason: "no backend registered under this name".to_string(),
                })?;

        info!("Switching to embedding backend {backend_name}");

        backend
            .activate()
            .await
            .map_err(|err| backend_unavailable(backend_name, err))?;

        let collection = build_collection(&self.source, backend.as_ref()).await;
        let context = Arc::new(ActiveContext {
            backend,
            collection,
        });
        *self.active.write().await = Some(Arc::clone(&context));

        info!("Embedding backend {backend_name} is active");
        Ok(context)
    }

    async fn embed_query(&self, context: &ActiveContext, query_text: &str) -> Result<Embedding> {
        let backend_name = context.backend.name();

        if let Some(embedding) = self.query_cache.get(backend_name, query_text).await {
            debug!("Cache hit for query embedding");
            return Ok(embedding);
        }

        let embedding = context
            .backend
            .embed_text(query_text)
            .await
            .and_then(|embedding| {
                check_dimension(context.backend.dimension(), &embedding).map(|()| embedding)
            })
            .map_err(|source| match source {
                EmbeddingError::UnsupportedInput(message) => SearchError::UnsupportedInput(message),
                source => SearchError::EmbeddingFailed {
                    backend: backend_name.to_string(),
                    source,
                },
            })?;

        self.query_cache
            .put(backend_name, query_text, embedding.clone())
            .await;

        Ok(embedding)
    }
}

/// Build a collection over `source` and report any images left out.
async fn build_collection(
    source: &[Arc<SourceImage>],
    backend: &dyn EmbeddingBackend,
) -> Arc<VectorCollection> {
    let collection = VectorCollection::build(source, backend).await;
    if collection.skipped_count() > 0 {
        warn!(
            "{} of {} images could not be embedded by {}",
            collection.skipped_count(),
            source.len(),
            backend.name()
        );
    }
    Arc::new(collection)
}

fn validate_request(k: usize, threshold: f32) -> Result<()> {
    if k == 0 {
        return Err(SearchError::InvalidArgument(
            "k must be at least 1".to_string(),
        ));
    }
    if threshold.is_nan() {
        return Err(SearchError::InvalidArgument(
            "threshold must be a number".to_string(),
        ));
    }
    Ok(())
}

fn backend_unavailable(backend_name: &str, err: EmbeddingError) -> SearchError {
    let reason = match err {
        EmbeddingError::BackendUnavailable { reason, .. } => reason,
        other => other.to_string(),
    };
    SearchError::BackendUnavailable {
        backend: backend_name.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_validate_request() {
        assert!(validate_request(1, 0.0).is_ok());
        assert!(validate_request(3, f32::NEG_INFINITY).is_ok());
        assert!(matches!(
            validate_request(0, 0.0),
            Err(SearchError::InvalidArgument(_))
        ));
        assert!(matches!(
            validate_request(1, f32::NAN),
            Err(SearchError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_session_creation() {
        let session = SearchSession::new(SearchConfig::default()).unwrap();
        assert_eq!(session.item_count(), 0);
        assert!(session.active_backend().await.is_none());
        assert!(session.backend_names().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = SearchSession::new(SearchConfig::default().with_default_k(0));
        assert!(matches!(result, Err(SearchError::Config(_))));
    }

    #[tokio::test]
    async fn test_unknown_backend() {
        let session = SearchSession::new(SearchConfig::default()).unwrap();
        let err = session.search("cat", "clip", 1, 0.0).await.unwrap_err();
        assert!(
            matches!(err, SearchError::BackendUnavailable { ref backend, .. } if backend == "clip")
        );
    }
}
