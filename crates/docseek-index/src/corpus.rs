//! The corpus directory and the format-dispatching loader that reads it.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::document::{
    DEFAULT_MAX_FILE_SIZE, Document, DocumentId, DocumentLoader, LoadError, TextLoader,
};
use crate::error::Result;

/// Flat directory holding the source files of the index.
#[derive(Debug, Clone)]
pub struct Corpus {
    dir: PathBuf,
}

impl Corpus {
    /// Open the corpus at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy `src` into the corpus under a fresh collision-free name.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or the copy fails.
    pub async fn add_file(&self, src: &Path) -> Result<DocumentId> {
        let name = src
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let id = DocumentId::generate(&name);
        tokio::fs::copy(src, self.dir.join(id.as_str())).await?;
        tracing::info!(file = %name, id = %id, "document added to corpus");
        Ok(id)
    }

    /// Store uploaded bytes under a fresh collision-free name derived from `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn add_bytes(&self, name: &str, bytes: &[u8]) -> Result<DocumentId> {
        let id = DocumentId::generate(name);
        tokio::fs::write(self.dir.join(id.as_str()), bytes).await?;
        tracing::info!(file = %name, id = %id, "document added to corpus");
        Ok(id)
    }

    /// Corpus files, sorted by name. Hidden files are not listed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub async fn list(&self) -> Result<Vec<DocumentId>> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_hidden(&name) {
                ids.push(DocumentId::from_file_name(name));
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Remove everything in the corpus directory, keeping the directory itself.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry cannot be removed.
    pub async fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tokio::fs::create_dir_all(&self.dir).await?;
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(entry.path()).await?;
            } else {
                tokio::fs::remove_file(entry.path()).await?;
            }
            removed += 1;
        }
        tracing::info!(removed, "corpus cleared");
        Ok(removed)
    }
}

/// A corpus file that was skipped during loading.
#[derive(Debug)]
pub struct LoadWarning {
    pub path: PathBuf,
    pub error: LoadError,
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.error)
    }
}

/// Output of one corpus pass.
#[derive(Debug, Default)]
pub struct CorpusLoad {
    pub documents: Vec<Document>,
    pub warnings: Vec<LoadWarning>,
    /// Every file the pass looked at, loaded or skipped, in file-name order.
    pub scanned: Vec<DocumentId>,
}

/// Extension-dispatching loader over a corpus directory.
pub struct CorpusLoader {
    loaders: Vec<Box<dyn DocumentLoader>>,
    by_extension: HashMap<String, usize>,
}

impl Default for CorpusLoader {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FILE_SIZE)
    }
}

impl CorpusLoader {
    /// Loader with every built-in format enabled at compile time.
    #[must_use]
    pub fn new(max_file_size: u64) -> Self {
        let mut loader = Self::empty();
        loader.register(Box::new(TextLoader { max_file_size }));
        #[cfg(feature = "pdf")]
        loader.register(Box::new(crate::document::PdfLoader { max_file_size }));
        #[cfg(feature = "docx")]
        loader.register(Box::new(crate::document::DocxLoader { max_file_size }));
        loader
    }

    #[must_use]
    pub fn empty() -> Self {
        Self {
            loaders: Vec::new(),
            by_extension: HashMap::new(),
        }
    }

    /// Register a loader. Later registrations win for shared extensions.
    pub fn register(&mut self, loader: Box<dyn DocumentLoader>) {
        let idx = self.loaders.len();
        for ext in loader.supported_extensions() {
            self.by_extension.insert(ext.to_ascii_lowercase(), idx);
        }
        self.loaders.push(loader);
    }

    #[must_use]
    pub fn supported_extensions(&self) -> Vec<&str> {
        let mut exts: Vec<&str> = self.by_extension.keys().map(String::as_str).collect();
        exts.sort_unstable();
        exts
    }

    fn loader_for(&self, path: &Path) -> Option<&dyn DocumentLoader> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.by_extension
            .get(&ext)
            .map(|&idx| self.loaders[idx].as_ref())
    }

    /// Load a single file with the loader registered for its extension.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedFormat` for unknown extensions, or the loader's error.
    pub async fn load_file(&self, path: &Path) -> std::result::Result<Document, LoadError> {
        let Some(loader) = self.loader_for(path) else {
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Err(LoadError::UnsupportedFormat(ext));
        };
        loader.load(path).await
    }

    /// Read every regular, non-hidden file directly inside `dir`, in file-name order.
    ///
    /// Per-file failures become warnings; only failing to list `dir` is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub async fn load(&self, dir: &Path) -> Result<CorpusLoad> {
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if is_hidden(&entry.file_name().to_string_lossy()) {
                continue;
            }
            paths.push(entry.path());
        }
        paths.sort();

        let mut out = CorpusLoad {
            scanned: paths
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| DocumentId::from_file_name(n.to_string_lossy()))
                .collect(),
            ..CorpusLoad::default()
        };

        for path in paths {
            match self.load_file(&path).await {
                Ok(doc) => {
                    tracing::debug!(file = %doc.id, bytes = doc.content.len(), "loaded");
                    out.documents.push(doc);
                }
                Err(error) => {
                    tracing::warn!(file = %path.display(), %error, "skipping file");
                    out.warnings.push(LoadWarning { path, error });
                }
            }
        }

        Ok(out)
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}
