//! Error types for docseek-index.

use std::path::PathBuf;
use std::time::Duration;

use docseek_llm::LlmError;

/// Failure to turn text into a vector. Fatal to the current indexing or query operation.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("embedding provider failed: {0}")]
    Provider(#[from] LlmError),

    #[error("provider {provider} does not support embeddings")]
    Unsupported { provider: &'static str },

    #[error("embedding provider returned an empty vector")]
    EmptyVector,

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Persisted artifacts are present but unreadable or inconsistent.
#[derive(Debug, thiserror::Error)]
#[error("corrupt index at {}: {reason}", .path.display())]
pub struct CorruptIndexError {
    pub path: PathBuf,
    pub reason: String,
}

impl CorruptIndexError {
    pub(crate) fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// The language model call failed. No history record is written.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("language model request failed: {0}")]
    Provider(#[source] LlmError),

    #[error("language model request timed out after {0:?}")]
    Timeout(Duration),

    #[error("language model returned an empty answer")]
    EmptyAnswer,
}

/// Writing or removing persisted artifacts failed. The previous artifacts stay valid.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid storage path: {}", .0.display())]
    InvalidPath(PathBuf),
}

/// Top-level error for indexing, persistence and query operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    CorruptIndex(#[from] CorruptIndexError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
