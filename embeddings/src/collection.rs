//! The searchable collection of embedded images.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::provider::{EmbeddingBackend, check_dimension};
use crate::{Embedding, SourceImage};

/// One embedded image.
///
/// `index` is the position of the image in the ingested sequence. It stays
/// the same across rebuilds, even when earlier items were skipped.
#[derive(Debug, Clone)]
pub struct CollectionItem {
    /// Ingestion index.
    pub index: usize,

    /// The source image.
    pub image: Arc<SourceImage>,

    /// Embedding produced by the collection's backend.
    pub embedding: Embedding,
}

/// An ingested image that could not be embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    /// Ingestion index.
    pub index: usize,

    /// Why the backend could not embed it.
    pub reason: String,
}

/// Result of embedding a single ingested image.
#[derive(Debug, Clone)]
pub enum ItemOutcome {
    Embedded(CollectionItem),
    Skipped(SkippedItem),
}

/// An ordered, immutable collection of embeddings from a single backend.
///
/// There is no update or delete: switching backends builds a new collection.
#[derive(Debug, Clone)]
pub struct VectorCollection {
    backend: String,
    dimension: usize,
    items: Vec<CollectionItem>,
    skipped: Vec<SkippedItem>,
}

impl VectorCollection {
    /// Embed every image in ingestion order.
    ///
    /// Images the backend fails on are left out and recorded in
    /// [`VectorCollection::skipped`]; the build itself never fails.
    pub async fn build(items: &[Arc<SourceImage>], backend: &dyn EmbeddingBackend) -> Self {
        info!(
            "Building vector collection of {} items with backend {}",
            items.len(),
            backend.name()
        );

        let mut outcomes = Vec::with_capacity(items.len());
        for (index, image) in items.iter().enumerate() {
            outcomes.push(Self::embed_item(index, image, backend).await);
        }

        let collection = Self::from_outcomes(backend.name(), backend.dimension(), outcomes);

        info!(
            "Built vector collection for {}: {} embedded, {} skipped",
            collection.backend,
            collection.len(),
            collection.skipped_count()
        );

        collection
    }

    async fn embed_item(
        index: usize,
        image: &Arc<SourceImage>,
        backend: &dyn EmbeddingBackend,
    ) -> ItemOutcome {
        let embedded = backend.embed_image(image).await.and_then(|embedding| {
            check_dimension(backend.dimension(), &embedding).map(|()| embedding)
        });

        match embedded {
            Ok(embedding) => {
                debug!("Embedded item {index}");
                ItemOutcome::Embedded(CollectionItem {
                    index,
                    image: Arc::clone(image),
                    embedding,
                })
            }
            Err(err) => {
                warn!("Skipping item {index}: {err}");
                ItemOutcome::Skipped(SkippedItem {
                    index,
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Assemble a collection from per-item outcomes, kept in the given order.
    pub fn from_outcomes(
        backend: impl Into<String>,
        dimension: usize,
        outcomes: impl IntoIterator<Item = ItemOutcome>,
    ) -> Self {
        let mut items = Vec::new();
        let mut skipped = Vec::new();
        for outcome in outcomes {
            match outcome {
                ItemOutcome::Embedded(item) => items.push(item),
                ItemOutcome::Skipped(item) => skipped.push(item),
            }
        }

        Self {
            backend: backend.into(),
            dimension,
            items,
            skipped,
        }
    }

    /// Name of the backend that produced every embedding here.
    pub fn backend_name(&self) -> &str {
        &self.backend
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Embedded items in ascending ingestion index.
    pub fn items(&self) -> &[CollectionItem] {
        &self.items
    }

    /// Get an item by its ingestion index.
    pub fn get(&self, index: usize) -> Option<&CollectionItem> {
        self.items
            .binary_search_by_key(&index, |item| item.index)
            .ok()
            .map(|pos| &self.items[pos])
    }

    pub fn skipped(&self) -> &[SkippedItem] {
        &self.skipped
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmbeddingError;
    use crate::provider::FnBackend;
    use pretty_assertions::assert_eq;

    /// Images are identified by width; the backend maps width to a vector.
    fn images(widths: &[u32]) -> Vec<Arc<SourceImage>> {
        widths
            .iter()
            .map(|&w| Arc::new(SourceImage::new_rgb8(w, 1)))
            .collect()
    }

    fn width_backend() -> FnBackend {
        FnBackend::new(
            "width",
            |image| match image.width() {
                3 => Err(EmbeddingError::EmbeddingFailed("corrupt".to_string())),
                4 => Ok(vec![1.0]),
                w => Ok(vec![w as f32, 0.0]),
            },
            |_| Ok(vec![1.0, 0.0]),
            2,
        )
    }

    #[tokio::test]
    async fn test_build_preserves_ingestion_order() {
        let backend = width_backend();
        let collection = VectorCollection::build(&images(&[5, 1, 2]), &backend).await;

        assert_eq!(collection.backend_name(), "width");
        assert_eq!(collection.len(), 3);
        let indices: Vec<usize> = collection.items().iter().map(|i| i.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(collection.items()[0].embedding, vec![5.0, 0.0]);
        assert_eq!(collection.skipped_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_items_are_skipped_not_fatal() {
        let backend = width_backend();
        // width 3 fails outright, width 4 returns the wrong dimensionality
        let collection = VectorCollection::build(&images(&[1, 3, 2, 4, 6]), &backend).await;

        let indices: Vec<usize> = collection.items().iter().map(|i| i.index).collect();
        assert_eq!(indices, vec![0, 2, 4]);
        assert_eq!(collection.skipped_count(), 2);
        assert_eq!(collection.skipped()[0].index, 1);
        assert!(collection.skipped()[1].reason.contains("dimension mismatch"));

        assert_eq!(collection.get(4).map(|i| i.embedding.clone()), Some(vec![6.0, 0.0]));
        assert!(collection.get(1).is_none());
    }

    #[tokio::test]
    async fn test_rebuild_is_deterministic() {
        let backend = width_backend();
        let source = images(&[2, 3, 7]);

        let first = VectorCollection::build(&source, &backend).await;
        let second = VectorCollection::build(&source, &backend).await;

        assert_eq!(first.len(), second.len());
        for (a, b) in first.items().iter().zip(second.items()) {
            assert_eq!(a.index, b.index);
            assert!(Arc::ptr_eq(&a.image, &b.image));
            assert_eq!(a.embedding, b.embedding);
        }
        assert_eq!(first.skipped(), second.skipped());
    }

    #[tokio::test]
    async fn test_empty_source() {
        let backend = width_backend();
        let collection = VectorCollection::build(&[], &backend).await;
        assert!(collection.is_empty());
        assert_eq!(collection.dimension(), 2);
    }
}
