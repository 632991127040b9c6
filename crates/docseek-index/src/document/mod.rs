pub mod error;
pub mod loader;
pub mod splitter;
pub mod types;

pub use error::LoadError;
#[cfg(feature = "docx")]
pub use loader::DocxLoader;
#[cfg(feature = "pdf")]
pub use loader::PdfLoader;
pub use loader::{DocumentLoader, TextLoader};
pub use splitter::{SplitterConfig, TextChunk, TextSplitter};
pub use types::{Document, DocumentFormat, DocumentId, DocumentMetadata};

/// Default maximum file size: 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;
