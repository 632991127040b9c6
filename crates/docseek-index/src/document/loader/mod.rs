use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use super::{Document, LoadError};

#[cfg(feature = "docx")]
mod docx;
#[cfg(feature = "pdf")]
mod pdf;
mod text;

#[cfg(feature = "docx")]
pub use docx::{DocxLoader, extract_docx_text};
#[cfg(feature = "pdf")]
pub use pdf::PdfLoader;
pub use text::TextLoader;

pub type LoadFuture<'a> = Pin<Box<dyn Future<Output = Result<Document, LoadError>> + Send + 'a>>;

/// Text extraction for one family of file formats.
pub trait DocumentLoader: Send + Sync {
    fn load(&self, path: &Path) -> LoadFuture<'_>;

    /// Lower-case extensions, without the leading dot.
    fn supported_extensions(&self) -> &[&str];
}

/// Canonicalize `path` and reject files over `max_size` bytes.
async fn checked_path(path: &Path, max_size: u64) -> Result<PathBuf, LoadError> {
    let path = tokio::fs::canonicalize(path).await?;
    let meta = tokio::fs::metadata(&path).await?;
    if meta.len() > max_size {
        return Err(LoadError::FileTooLarge(meta.len()));
    }
    Ok(path)
}
