use std::path::Path;

use super::super::{DEFAULT_MAX_FILE_SIZE, Document, DocumentFormat, LoadError};
use super::{DocumentLoader, LoadFuture, checked_path};

pub struct PdfLoader {
    pub max_file_size: u64,
}

impl Default for PdfLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl DocumentLoader for PdfLoader {
    fn load(&self, path: &Path) -> LoadFuture<'_> {
        let path = path.to_path_buf();
        let max_size = self.max_file_size;
        Box::pin(async move {
            let path = checked_path(&path, max_size).await?;

            let path_buf = path.clone();
            // pdf-extract may panic on malformed input; a panic surfaces as a JoinError.
            let content = tokio::task::spawn_blocking(move || {
                pdf_extract::extract_text(&path_buf).map_err(|e| LoadError::Pdf(e.to_string()))
            })
            .await
            .map_err(|e| LoadError::Pdf(format!("extraction aborted: {e}")))??;

            Ok(Document::new(path, content, DocumentFormat::Pdf))
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["pdf"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn corrupt_pdf_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("broken.pdf");
        std::fs::write(&file, b"%PDF-1.4 this is not really a pdf").unwrap();

        let result = PdfLoader::default().load(&file).await;
        assert!(matches!(result, Err(LoadError::Pdf(_))));
    }

    #[tokio::test]
    async fn oversized_pdf_rejected_before_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("big.pdf");
        std::fs::write(&file, b"%PDF").unwrap();

        let loader = PdfLoader { max_file_size: 1 };
        assert!(matches!(
            loader.load(&file).await,
            Err(LoadError::FileTooLarge(4))
        ));
    }

    #[test]
    fn supported_extensions_list() {
        assert_eq!(PdfLoader::default().supported_extensions(), &["pdf"]);
    }
}
