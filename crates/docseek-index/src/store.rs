//! In-memory flat vector index with exact cosine search.

use std::collections::BTreeSet;

use crate::document::{DocumentId, DocumentMetadata, TextChunk};
use crate::error::EmbeddingError;

/// A chunk together with its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    /// `<document id>#<chunk index>`.
    pub id: String,
    pub document_id: DocumentId,
    pub content: String,
    pub byte_range: (usize, usize),
    pub metadata: DocumentMetadata,
    pub vector: Vec<f32>,
}

impl IndexedChunk {
    #[must_use]
    pub fn new(chunk: TextChunk, vector: Vec<f32>) -> Self {
        Self {
            id: chunk_id(&chunk.document_id, chunk.chunk_index),
            document_id: chunk.document_id,
            content: chunk.content,
            byte_range: chunk.byte_range,
            metadata: chunk.metadata,
            vector,
        }
    }
}

#[must_use]
pub fn chunk_id(document_id: &DocumentId, chunk_index: usize) -> String {
    format!("{document_id}#{chunk_index}")
}

/// A search hit. Carries the chunk text and metadata but not its vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub id: String,
    pub document_id: DocumentId,
    pub content: String,
    pub byte_range: (usize, usize),
    pub metadata: DocumentMetadata,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    model: String,
    chunks: Vec<IndexedChunk>,
}

impl VectorIndex {
    /// Build an index from a complete chunk set.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if any vector length differs from `dimension`.
    pub fn build(
        chunks: Vec<IndexedChunk>,
        dimension: usize,
        model: impl Into<String>,
    ) -> Result<Self, EmbeddingError> {
        if let Some(bad) = chunks.iter().find(|c| c.vector.len() != dimension) {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimension,
                actual: bad.vector.len(),
            });
        }
        Ok(Self {
            dimension,
            model: model.into(),
            chunks,
        })
    }

    /// Top `k` chunks by cosine similarity, best first. Ties keep insertion order.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if `query` has the wrong length.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, EmbeddingError> {
        if query.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.chunks.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (i, cosine_similarity(query, &c.vector)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| {
                let c = &self.chunks[i];
                ScoredChunk {
                    id: c.id.clone(),
                    document_id: c.document_id.clone(),
                    content: c.content.clone(),
                    byte_range: c.byte_range,
                    metadata: c.metadata.clone(),
                    score,
                }
            })
            .collect())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn chunks(&self) -> &[IndexedChunk] {
        &self.chunks
    }

    #[must_use]
    pub fn document_count(&self) -> usize {
        self.chunks
            .iter()
            .map(|c| &c.document_id)
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn chunks_for_document<'a>(
        &'a self,
        id: &'a DocumentId,
    ) -> impl Iterator<Item = &'a IndexedChunk> + 'a {
        self.chunks.iter().filter(move |c| &c.document_id == id)
    }
}

/// Cosine similarity; zero-norm input scores 0.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentFormat;

    fn chunk(doc: &str, index: usize, content: &str, vector: Vec<f32>) -> IndexedChunk {
        let document_id = DocumentId::from_file_name(doc);
        IndexedChunk::new(
            TextChunk {
                metadata: DocumentMetadata {
                    source: doc.to_owned(),
                    file_name: document_id.display_name().to_owned(),
                    format: DocumentFormat::Text,
                },
                document_id,
                content: content.to_owned(),
                byte_range: (0, content.len()),
                chunk_index: index,
            },
            vector,
        )
    }

    fn sample() -> VectorIndex {
        VectorIndex::build(
            vec![
                chunk("a.txt", 0, "x axis", vec![1.0, 0.0, 0.0]),
                chunk("a.txt", 1, "y axis", vec![0.0, 1.0, 0.0]),
                chunk("b.txt", 0, "diagonal", vec![0.7, 0.7, 0.0]),
            ],
            3,
            "test-model",
        )
        .unwrap()
    }

    #[test]
    fn cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_and_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]).abs() < f32::EPSILON);
    }

    #[test]
    fn chunk_ids() {
        let index = sample();
        let ids: Vec<&str> = index.chunks().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a.txt#0", "a.txt#1", "b.txt#0"]);
    }

    #[test]
    fn build_rejects_wrong_dimension() {
        let err = VectorIndex::build(
            vec![
                chunk("a.txt", 0, "ok", vec![1.0, 0.0]),
                chunk("a.txt", 1, "bad", vec![1.0, 0.0, 0.0]),
            ],
            2,
            "m",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn search_orders_by_score() {
        let results = sample().search(&[1.0, 0.0, 0.0], 3).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].id, "a.txt#0");
        assert_eq!(results[1].id, "b.txt#0");
        assert_eq!(results[2].id, "a.txt#1");
    }

    #[test]
    fn search_limits_to_k() {
        let results = sample().search(&[0.0, 1.0, 0.0], 1).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "y axis");
    }

    #[test]
    fn search_k_larger_than_index() {
        assert_eq!(sample().search(&[1.0, 1.0, 1.0], 50).unwrap().len(), 3);
    }

    #[test]
    fn search_k_zero() {
        assert!(sample().search(&[1.0, 0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn search_empty_index() {
        let index = VectorIndex::build(Vec::new(), 3, "m").unwrap();
        assert!(index.is_empty());
        assert!(index.search(&[1.0, 0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn search_wrong_query_dimension() {
        let err = sample().search(&[1.0, 0.0], 2).unwrap_err();
        assert!(matches!(err, EmbeddingError::DimensionMismatch { .. }));
    }

    #[test]
    fn ties_keep_insertion_order() {
        let index = VectorIndex::build(
            vec![
                chunk("a.txt", 0, "first", vec![1.0, 0.0]),
                chunk("b.txt", 0, "second", vec![1.0, 0.0]),
                chunk("c.txt", 0, "third", vec![1.0, 0.0]),
            ],
            2,
            "m",
        )
        .unwrap();
        let ids: Vec<String> = index
            .search(&[1.0, 0.0], 3)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["a.txt#0", "b.txt#0", "c.txt#0"]);
    }

    #[test]
    fn accessors() {
        let index = sample();
        assert_eq!(index.len(), 3);
        assert_eq!(index.dimension(), 3);
        assert_eq!(index.model(), "test-model");
        assert_eq!(index.document_count(), 2);
        let a = DocumentId::from_file_name("a.txt");
        assert_eq!(index.chunks_for_document(&a).count(), 2);
    }

    mod proptest_search {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn results_bounded_and_sorted(
                vectors in proptest::collection::vec(
                    proptest::collection::vec(-1.0f32..1.0, 4),
                    0..40,
                ),
                query in proptest::collection::vec(-1.0f32..1.0, 4),
                k in 0usize..60,
            ) {
                let chunks: Vec<IndexedChunk> = vectors
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| chunk("p.txt", i, "text", v))
                    .collect();
                let len = chunks.len();
                let index = VectorIndex::build(chunks, 4, "m").unwrap();
                let results = index.search(&query, k).unwrap();

                prop_assert_eq!(results.len(), k.min(len));
                for pair in results.windows(2) {
                    prop_assert!(pair[0].score >= pair[1].score);
                }
            }
        }
    }
}
