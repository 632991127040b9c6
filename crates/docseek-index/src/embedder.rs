use std::sync::Arc;

use docseek_llm::LlmProvider;
use docseek_llm::any::AnyProvider;

use crate::error::EmbeddingError;

const PROBE_TEXT: &str = "dimension probe";

/// Shared text-to-vector function with a fixed, probed output dimension.
#[derive(Debug, Clone)]
pub struct Embedder {
    provider: Arc<AnyProvider>,
    dimension: usize,
    model: String,
}

impl Embedder {
    /// Probe the provider once and cache the vector dimension.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot embed or returns an empty vector.
    pub async fn new(provider: Arc<AnyProvider>) -> Result<Self, EmbeddingError> {
        if !provider.supports_embeddings() {
            return Err(EmbeddingError::Unsupported {
                provider: provider.name(),
            });
        }

        let probe = provider.embed(PROBE_TEXT).await?;
        if probe.is_empty() {
            return Err(EmbeddingError::EmptyVector);
        }

        let model = provider.embedding_model().to_owned();
        tracing::info!(model = %model, dimension = probe.len(), "embedding model ready");

        Ok(Self {
            provider,
            dimension: probe.len(),
            model,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the provider fails or the vector has the wrong length.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let vector = self.provider.embed(text).await?;
        if vector.is_empty() {
            return Err(EmbeddingError::EmptyVector);
        }
        if vector.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(vector)
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
    pub fn provider(&self) -> &Arc<AnyProvider> {
        &self.provider
    }

    /// Skip the probe and trust the given dimension.
    #[cfg(test)]
    pub(crate) fn with_probed(provider: Arc<AnyProvider>, dimension: usize, model: &str) -> Self {
        Self {
            provider,
            dimension,
            model: model.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use docseek_llm::hash::HashEmbedder;
    use docseek_llm::mock::MockProvider;

    use super::*;

    #[tokio::test]
    async fn probes_dimension() {
        let provider = Arc::new(AnyProvider::from(HashEmbedder::new(32)));
        let embedder = Embedder::new(provider).await.unwrap();
        assert_eq!(embedder.dimension(), 32);
        assert_eq!(embedder.model(), "hash-32");
        assert_eq!(embedder.embed("hello").await.unwrap().len(), 32);
    }

    #[tokio::test]
    async fn embedding_is_deterministic() {
        let provider = Arc::new(AnyProvider::from(HashEmbedder::default()));
        let embedder = Embedder::new(provider).await.unwrap();
        let a = embedder.embed("The sky is blue.").await.unwrap();
        let b = embedder.embed("The sky is blue.").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn provider_without_embeddings_is_rejected() {
        let provider = Arc::new(AnyProvider::from(MockProvider::default()));
        let err = Embedder::new(provider).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Unsupported { provider: "mock" }));
    }

    #[tokio::test]
    async fn empty_probe_is_rejected() {
        let provider = Arc::new(AnyProvider::from(
            MockProvider::default().with_embedding(vec![]),
        ));
        let err = Embedder::new(provider).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::EmptyVector));
    }

    #[tokio::test]
    async fn mock_embedding_dimension() {
        let provider = Arc::new(AnyProvider::from(
            MockProvider::default().with_embedding(vec![0.1, 0.2, 0.3]),
        ));
        let embedder = Embedder::new(provider).await.unwrap();
        assert_eq!(embedder.dimension(), 3);
        assert_eq!(embedder.model(), "mock-embedding");
    }
}
