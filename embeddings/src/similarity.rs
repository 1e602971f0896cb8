//! Similarity computation and ranking.

use std::sync::Arc;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::SourceImage;
use crate::collection::VectorCollection;
use crate::error::{EmbeddingError, Result};

/// Compute the dot product between two embeddings.
pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    Ok(a.iter().zip(b.iter()).map(|(x, y)| x * y).sum())
}

/// Compute the cosine similarity between two embeddings.
///
/// Returns a value between -1.0 and 1.0, and 0.0 if either vector is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    let dot = dot_product(a, b)?;
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return Ok(0.0);
    }

    Ok(dot / (magnitude_a * magnitude_b))
}

/// How query and item embeddings are scored against each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Raw inner product of the unnormalized embeddings.
    #[default]
    DotProduct,
    /// Inner product of the unit-normalized embeddings.
    Cosine,
}

impl SimilarityMetric {
    pub fn score(self, query: &[f32], item: &[f32]) -> Result<f32> {
        match self {
            Self::DotProduct => dot_product(query, item),
            Self::Cosine => cosine_similarity(query, item),
        }
    }
}

/// One ranked match.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Ingestion index of the matched image.
    pub index: usize,

    /// The matched image.
    pub image: Arc<SourceImage>,

    /// Similarity score.
    pub score: f32,
}

/// Ranked matches for one query.
///
/// Hits are ordered by descending score, ties by ascending index. An empty
/// result means nothing cleared the threshold.
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    pub hits: Vec<SearchHit>,

    /// Ingested images missing from the ranked collection because the
    /// backend could not embed them.
    pub skipped: usize,
}

impl SearchResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// `(index, score)` pairs in rank order.
    pub fn scores(&self) -> Vec<(usize, f32)> {
        self.hits.iter().map(|hit| (hit.index, hit.score)).collect()
    }
}

/// Find the top-k items scoring strictly above `threshold`.
pub fn rank(
    query: &[f32],
    collection: &VectorCollection,
    k: usize,
    threshold: f32,
    metric: SimilarityMetric,
) -> Result<SearchResult> {
    if k == 0 {
        return Err(EmbeddingError::InvalidArgument(
            "k must be at least 1".to_string(),
        ));
    }
    if threshold.is_nan() {
        return Err(EmbeddingError::InvalidArgument(
            "threshold must be a number".to_string(),
        ));
    }
    if query.len() != collection.dimension() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: collection.dimension(),
            actual: query.len(),
        });
    }

    let mut scores: Vec<(OrderedFloat<f32>, usize, &Arc<SourceImage>)> =
        Vec::with_capacity(collection.len());

    for item in collection.items() {
        let score = metric.score(query, &item.embedding)?;
        // NaN never compares greater, so degenerate scores drop out here
        if score > threshold {
            scores.push((OrderedFloat(score), item.index, &item.image));
        }
    }

    // Sort by score descending, then index ascending
    scores.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    let hits = scores
        .into_iter()
        .take(k)
        .map(|(score, index, image)| SearchHit {
            index,
            image: Arc::clone(image),
            score: score.0,
        })
        .collect();

    Ok(SearchResult {
        hits,
        skipped: collection.skipped_count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{CollectionItem, ItemOutcome, SkippedItem};
    use pretty_assertions::assert_eq;

    fn collection(embeddings: &[&[f32]]) -> VectorCollection {
        let dimension = embeddings.first().map_or(0, |e| e.len());
        VectorCollection::from_outcomes(
            "test",
            dimension,
            embeddings.iter().enumerate().map(|(index, e)| {
                ItemOutcome::Embedded(CollectionItem {
                    index,
                    image: Arc::new(SourceImage::new_rgb8(1, 1)),
                    embedding: e.to_vec(),
                })
            }),
        )
    }

    fn three_items() -> VectorCollection {
        collection(&[&[1.0, 0.0], &[0.0, 1.0], &[0.7, 0.7]])
    }

    #[test]
    fn test_dot_product() {
        assert_eq!(dot_product(&[1.0, 2.0], &[3.0, 4.0]).unwrap(), 11.0);
        assert!(dot_product(&[1.0], &[1.0, 0.0]).is_err());
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[-2.0, 0.0, 0.0]).unwrap();
        assert!((sim - (-1.0)).abs() < 1e-6);
    }

    #[test]
    fn test_rank_threshold_and_k() {
        let results =
            rank(&[1.0, 0.0], &three_items(), 2, 0.5, SimilarityMetric::DotProduct).unwrap();
        assert_eq!(results.scores(), vec![(0, 1.0), (2, 0.7)]);
    }

    #[test]
    fn test_rank_k_one() {
        let results =
            rank(&[1.0, 0.0], &three_items(), 1, 0.5, SimilarityMetric::DotProduct).unwrap();
        assert_eq!(results.scores(), vec![(0, 1.0)]);
    }

    #[test]
    fn test_rank_high_threshold() {
        let results =
            rank(&[1.0, 0.0], &three_items(), 2, 0.95, SimilarityMetric::DotProduct).unwrap();
        assert_eq!(results.scores(), vec![(0, 1.0)]);
    }

    #[test]
    fn test_rank_threshold_is_exclusive() {
        let results =
            rank(&[1.0, 0.0], &three_items(), 3, 1.0, SimilarityMetric::DotProduct).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_rank_rejects_zero_k() {
        let err =
            rank(&[1.0, 0.0], &three_items(), 0, 0.5, SimilarityMetric::DotProduct).unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidArgument(_)));
    }

    #[test]
    fn test_rank_rejects_nan_threshold() {
        let err = rank(&[1.0, 0.0], &three_items(), 1, f32::NAN, SimilarityMetric::DotProduct)
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidArgument(_)));
    }

    #[test]
    fn test_rank_query_dimension_mismatch() {
        let err = rank(&[1.0, 0.0, 0.0], &three_items(), 1, 0.0, SimilarityMetric::DotProduct)
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::DimensionMismatch { expected: 2, actual: 3 }));
    }

    #[test]
    fn test_rank_ties_break_by_index() {
        let items = collection(&[&[0.5, 0.0], &[1.0, 0.0], &[0.5, 0.0], &[1.0, 0.0]]);
        let results = rank(&[1.0, 0.0], &items, 4, 0.0, SimilarityMetric::DotProduct).unwrap();
        assert_eq!(results.scores(), vec![(1, 1.0), (3, 1.0), (0, 0.5), (2, 0.5)]);
    }

    #[test]
    fn test_rank_uses_raw_dot_product_by_default() {
        // The long vector wins on dot product but ties on cosine.
        let items = collection(&[&[1.0, 0.0], &[4.0, 0.0]]);

        let dot = rank(&[1.0, 0.0], &items, 2, 0.0, SimilarityMetric::default()).unwrap();
        assert_eq!(dot.scores(), vec![(1, 4.0), (0, 1.0)]);

        let cosine = rank(&[1.0, 0.0], &items, 2, 0.0, SimilarityMetric::Cosine).unwrap();
        assert_eq!(cosine.scores(), vec![(0, 1.0), (1, 1.0)]);
    }

    #[test]
    fn test_rank_drops_nan_scores() {
        let items = collection(&[&[f32::NAN, 0.0], &[0.2, 0.0]]);
        let results = rank(&[1.0, 0.0], &items, 2, f32::NEG_INFINITY, SimilarityMetric::DotProduct)
            .unwrap();
        assert_eq!(results.scores(), vec![(1, 0.2)]);
    }

    #[test]
    fn test_rank_reports_skipped_items() {
        let items = VectorCollection::from_outcomes(
            "test",
            2,
            vec![
                ItemOutcome::Skipped(SkippedItem {
                    index: 0,
                    reason: "corrupt".to_string(),
                }),
                ItemOutcome::Embedded(CollectionItem {
                    index: 1,
                    image: Arc::new(SourceImage::new_rgb8(1, 1)),
                    embedding: vec![1.0, 0.0],
                }),
            ],
        );

        let results = rank(&[1.0, 0.0], &items, 5, 0.0, SimilarityMetric::DotProduct).unwrap();
        assert_eq!(results.scores(), vec![(1, 1.0)]);
        assert_eq!(results.skipped, 1);
    }
}
