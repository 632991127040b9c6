//! Document indexing and retrieval engine.
//!
//! Pipeline: a [`corpus::CorpusLoader`] extracts text from the corpus directory,
//! [`document::TextSplitter`] cuts it into chunks, [`embedder::Embedder`] turns
//! each chunk into a vector, and [`store::VectorIndex`] serves cosine top-K
//! search. [`persist::IndexStorage`] keeps the index on disk between runs,
//! [`manager::IndexManager`] owns the index lifecycle, and
//! [`query::QueryEngine`] answers questions through an external LLM.

pub mod corpus;
pub mod document;
pub mod embedder;
pub mod error;
pub mod history;
pub mod manager;
pub mod persist;
pub mod query;
pub mod store;

pub use error::{
    CorruptIndexError, EmbeddingError, GenerationError, IndexError, PersistenceError, Result,
};
