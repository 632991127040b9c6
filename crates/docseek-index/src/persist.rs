//! On-disk form of a [`VectorIndex`].
//!
//! Three JSON artifacts live in the storage directory: `docstore.json` (chunk
//! text and metadata), `vector_store.json` (chunk id and vector, in index
//! order) and `index_meta.json`. The metadata carries blake3 checksums of the
//! other two and is written last, so a directory without a parseable
//! `index_meta.json` is never treated as an index.
//!
//! `persist` writes a complete copy into a sibling staging directory and
//! renames it into place; the previous directory is moved aside first and
//! deleted only after the swap succeeded.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::document::{DocumentId, DocumentMetadata};
use crate::error::{CorruptIndexError, PersistenceError};
use crate::store::{IndexedChunk, VectorIndex};

pub const FORMAT_VERSION: u32 = 1;

pub const DOCSTORE_FILE: &str = "docstore.json";
pub const VECTOR_STORE_FILE: &str = "vector_store.json";
pub const META_FILE: &str = "index_meta.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub format_version: u32,
    pub embedding_model: String,
    pub dimension: usize,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
    pub docstore_checksum: String,
    pub vector_store_checksum: String,
    /// Corpus files present when the index was built, including skipped ones.
    #[serde(default)]
    pub source_files: Vec<DocumentId>,
}

#[derive(Serialize, Deserialize)]
struct StoredChunk {
    id: String,
    document_id: DocumentId,
    content: String,
    byte_range: (usize, usize),
    metadata: DocumentMetadata,
}

#[derive(Serialize, Deserialize)]
struct Docstore {
    chunks: Vec<StoredChunk>,
}

#[derive(Serialize, Deserialize)]
struct StoredVector {
    id: String,
    vector: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct VectorStore {
    vectors: Vec<StoredVector>,
}

/// Persisted index location.
#[derive(Debug, Clone)]
pub struct IndexStorage {
    dir: PathBuf,
}

impl IndexStorage {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// True iff all three artifacts are present and the metadata parses.
    pub async fn exists(&self) -> bool {
        if !tokio::fs::try_exists(self.dir.join(DOCSTORE_FILE))
            .await
            .unwrap_or(false)
            || !tokio::fs::try_exists(self.dir.join(VECTOR_STORE_FILE))
                .await
                .unwrap_or(false)
        {
            return false;
        }
        self.meta().await.is_ok()
    }

    /// Read and parse `index_meta.json`.
    ///
    /// # Errors
    ///
    /// Returns `CorruptIndexError` if the file is missing or does not parse.
    pub async fn meta(&self) -> Result<IndexMeta, CorruptIndexError> {
        let bytes = self.read_artifact(META_FILE).await?;
        serde_json::from_slice(&bytes).map_err(|e| self.corrupt(format!("{META_FILE}: {e}")))
    }

    /// Restore a persisted index built with `expected_model` at `expected_dimension`.
    ///
    /// # Errors
    ///
    /// Returns `CorruptIndexError` if any artifact is unreadable, fails its checksum,
    /// or disagrees with the metadata or the current embedding model.
    pub async fn load(
        &self,
        expected_model: &str,
        expected_dimension: usize,
    ) -> Result<VectorIndex, CorruptIndexError> {
        let meta = self.meta().await?;

        if meta.format_version != FORMAT_VERSION {
            return Err(self.corrupt(format!(
                "unknown format version {}",
                meta.format_version
            )));
        }
        if meta.embedding_model != expected_model {
            return Err(self.corrupt(format!(
                "built with embedding model {}, current model is {expected_model}",
                meta.embedding_model
            )));
        }
        if meta.dimension != expected_dimension {
            return Err(self.corrupt(format!(
                "built with dimension {}, current dimension is {expected_dimension}",
                meta.dimension
            )));
        }

        let docstore_bytes = self.read_artifact(DOCSTORE_FILE).await?;
        self.verify_checksum(DOCSTORE_FILE, &docstore_bytes, &meta.docstore_checksum)?;
        let vector_bytes = self.read_artifact(VECTOR_STORE_FILE).await?;
        self.verify_checksum(VECTOR_STORE_FILE, &vector_bytes, &meta.vector_store_checksum)?;

        let docstore: Docstore = serde_json::from_slice(&docstore_bytes)
            .map_err(|e| self.corrupt(format!("{DOCSTORE_FILE}: {e}")))?;
        let vectors: VectorStore = serde_json::from_slice(&vector_bytes)
            .map_err(|e| self.corrupt(format!("{VECTOR_STORE_FILE}: {e}")))?;

        if docstore.chunks.len() != meta.chunk_count || vectors.vectors.len() != meta.chunk_count
        {
            return Err(self.corrupt(format!(
                "chunk count mismatch: metadata {}, docstore {}, vector store {}",
                meta.chunk_count,
                docstore.chunks.len(),
                vectors.vectors.len()
            )));
        }

        let mut chunks = Vec::with_capacity(meta.chunk_count);
        for (stored, vector) in docstore.chunks.into_iter().zip(vectors.vectors) {
            if stored.id != vector.id {
                return Err(self.corrupt(format!(
                    "docstore chunk {} has no matching vector (found {})",
                    stored.id, vector.id
                )));
            }
            chunks.push(IndexedChunk {
                id: stored.id,
                document_id: stored.document_id,
                content: stored.content,
                byte_range: stored.byte_range,
                metadata: stored.metadata,
                vector: vector.vector,
            });
        }

        let index = VectorIndex::build(chunks, meta.dimension, meta.embedding_model)
            .map_err(|e| self.corrupt(e.to_string()))?;
        tracing::info!(
            path = %self.dir.display(),
            chunks = index.len(),
            "loaded persisted index"
        );
        Ok(index)
    }

    /// Write `index` to the storage directory, replacing any previous artifacts.
    ///
    /// `source_files` records the corpus the index was built from.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError` on IO or serialization failure. The previously
    /// persisted index, if any, is left in place.
    pub async fn persist(
        &self,
        index: &VectorIndex,
        source_files: &[DocumentId],
    ) -> Result<IndexMeta, PersistenceError> {
        let (staging, backup) = self.sibling_dirs()?;

        remove_dir_if_exists(&staging).await?;
        tokio::fs::create_dir_all(&staging).await?;

        let meta = match write_artifacts(&staging, index, source_files).await {
            Ok(meta) => meta,
            Err(e) => {
                let _ = tokio::fs::remove_dir_all(&staging).await;
                return Err(e);
            }
        };

        remove_dir_if_exists(&backup).await?;
        let had_previous = tokio::fs::try_exists(&self.dir).await?;
        if had_previous {
            tokio::fs::rename(&self.dir, &backup).await?;
        }

        if let Err(e) = tokio::fs::rename(&staging, &self.dir).await {
            if had_previous {
                let _ = tokio::fs::rename(&backup, &self.dir).await;
            }
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(e.into());
        }

        if had_previous && let Err(e) = tokio::fs::remove_dir_all(&backup).await {
            tracing::warn!(path = %backup.display(), error = %e, "failed to remove old index");
        }

        tracing::info!(
            path = %self.dir.display(),
            chunks = meta.chunk_count,
            "index persisted"
        );
        Ok(meta)
    }

    /// Delete all persisted artifacts, including leftover staging directories.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError` if a directory exists but cannot be removed.
    pub async fn remove(&self) -> Result<(), PersistenceError> {
        remove_dir_if_exists(&self.dir).await?;
        let (staging, backup) = self.sibling_dirs()?;
        remove_dir_if_exists(&staging).await?;
        remove_dir_if_exists(&backup).await?;
        Ok(())
    }

    fn sibling_dirs(&self) -> Result<(PathBuf, PathBuf), PersistenceError> {
        let invalid = || PersistenceError::InvalidPath(self.dir.clone());
        let name = self.dir.file_name().ok_or_else(invalid)?.to_string_lossy();
        let parent = self.dir.parent().ok_or_else(invalid)?;
        Ok((
            parent.join(format!(".{name}.staging")),
            parent.join(format!(".{name}.old")),
        ))
    }

    async fn read_artifact(&self, name: &str) -> Result<Vec<u8>, CorruptIndexError> {
        tokio::fs::read(self.dir.join(name))
            .await
            .map_err(|e| self.corrupt(format!("cannot read {name}: {e}")))
    }

    fn verify_checksum(
        &self,
        name: &str,
        bytes: &[u8],
        expected: &str,
    ) -> Result<(), CorruptIndexError> {
        let actual = checksum(bytes);
        if actual == expected {
            Ok(())
        } else {
            Err(self.corrupt(format!("{name} checksum mismatch")))
        }
    }

    fn corrupt(&self, reason: impl Into<String>) -> CorruptIndexError {
        CorruptIndexError::new(&self.dir, reason)
    }
}

async fn write_artifacts(
    dir: &Path,
    index: &VectorIndex,
    source_files: &[DocumentId],
) -> Result<IndexMeta, PersistenceError> {
    let docstore = Docstore {
        chunks: index
            .chunks()
            .iter()
            .map(|c| StoredChunk {
                id: c.id.clone(),
                document_id: c.document_id.clone(),
                content: c.content.clone(),
                byte_range: c.byte_range,
                metadata: c.metadata.clone(),
            })
            .collect(),
    };
    let vectors = VectorStore {
        vectors: index
            .chunks()
            .iter()
            .map(|c| StoredVector {
                id: c.id.clone(),
                vector: c.vector.clone(),
            })
            .collect(),
    };

    let docstore_bytes = serde_json::to_vec(&docstore)?;
    let vector_bytes = serde_json::to_vec(&vectors)?;

    let meta = IndexMeta {
        format_version: FORMAT_VERSION,
        embedding_model: index.model().to_owned(),
        dimension: index.dimension(),
        chunk_count: index.len(),
        created_at: Utc::now(),
        docstore_checksum: checksum(&docstore_bytes),
        vector_store_checksum: checksum(&vector_bytes),
        source_files: source_files.to_vec(),
    };

    write_synced(&dir.join(DOCSTORE_FILE), &docstore_bytes).await?;
    write_synced(&dir.join(VECTOR_STORE_FILE), &vector_bytes).await?;
    write_synced(&dir.join(META_FILE), &serde_json::to_vec_pretty(&meta)?).await?;

    Ok(meta)
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

async fn remove_dir_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn checksum(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}
