//! Chat and embedding provider abstraction.
//!
//! The indexing engine talks to language models only through [`LlmProvider`].
//! Backends: Ollama (chat + embeddings over HTTP) and [`hash::HashEmbedder`],
//! a deterministic offline embedder.

pub mod any;
pub mod error;
pub mod hash;
#[cfg(feature = "mock")]
pub mod mock;
pub mod ollama;
pub mod provider;

pub use error::LlmError;
pub use provider::LlmProvider;
