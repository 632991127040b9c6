use std::path::Path;

use super::super::{DEFAULT_MAX_FILE_SIZE, Document, DocumentFormat, LoadError};
use super::{DocumentLoader, LoadFuture, checked_path};

pub struct TextLoader {
    pub max_file_size: u64,
}

impl Default for TextLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl DocumentLoader for TextLoader {
    fn load(&self, path: &Path) -> LoadFuture<'_> {
        let path = path.to_path_buf();
        let max_size = self.max_file_size;
        Box::pin(async move {
            let path = checked_path(&path, max_size).await?;

            let format = match path.extension().and_then(|e| e.to_str()) {
                Some(ext) if ext.eq_ignore_ascii_case("md") => DocumentFormat::Markdown,
                Some(ext) if ext.eq_ignore_ascii_case("markdown") => DocumentFormat::Markdown,
                _ => DocumentFormat::Text,
            };

            let bytes = tokio::fs::read(&path).await?;
            let content = String::from_utf8(bytes)?;

            Ok(Document::new(path, content, format))
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["txt", "md", "markdown"]
    }
}
