//! Index lifecycle: load or build at startup, rebuild on corpus changes, clear.
//!
//! One writer at a time holds `write_lock` for the whole of a build, rebuild or
//! clear. Readers take a cheap `Arc` clone of the live index; a finished build
//! swaps the pointer only after the new index has been persisted.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use tokio::sync::{Mutex, watch};

use crate::corpus::{Corpus, CorpusLoader, LoadWarning};
use crate::document::{DocumentId, SplitterConfig, TextSplitter};
use crate::embedder::Embedder;
use crate::error::Result;
use crate::history::QueryHistory;
use crate::persist::IndexStorage;
use crate::store::{IndexedChunk, VectorIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Absent,
    Building,
    Ready,
    Rebuilding,
    Cleared,
}

impl IndexState {
    #[must_use]
    pub fn is_building(self) -> bool {
        matches!(self, Self::Building | Self::Rebuilding)
    }
}

impl std::fmt::Display for IndexState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::Building => "building",
            Self::Ready => "ready",
            Self::Rebuilding => "rebuilding",
            Self::Cleared => "cleared",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub corpus_dir: PathBuf,
    pub index_dir: PathBuf,
    pub history_file: PathBuf,
}

/// Summary of an indexing run.
#[derive(Debug, Default)]
pub struct IndexReport {
    pub files_scanned: usize,
    pub documents_indexed: usize,
    pub chunks_created: usize,
    pub warnings: Vec<LoadWarning>,
    pub duration_ms: u64,
}

/// How [`IndexManager::open`] obtained the live index.
#[derive(Debug)]
pub enum OpenOutcome {
    Loaded { chunks: usize },
    Built(IndexReport),
    /// The persisted index could not be used and was rebuilt from the corpus.
    Rebuilt { reason: String, report: IndexReport },
}

pub struct IndexManager {
    corpus: Corpus,
    storage: IndexStorage,
    history: QueryHistory,
    embedder: Embedder,
    splitter: TextSplitter,
    loader: CorpusLoader,
    write_lock: Mutex<()>,
    current: RwLock<Option<Arc<VectorIndex>>>,
    state_tx: watch::Sender<IndexState>,
}

impl IndexManager {
    /// # Errors
    ///
    /// Returns an error if the corpus directory cannot be created.
    pub async fn new(
        paths: IndexPaths,
        embedder: Embedder,
        splitter: SplitterConfig,
        max_file_size: u64,
    ) -> Result<Self> {
        let corpus = Corpus::open(paths.corpus_dir).await?;
        let (state_tx, _) = watch::channel(IndexState::Absent);
        Ok(Self {
            corpus,
            storage: IndexStorage::new(paths.index_dir),
            history: QueryHistory::new(paths.history_file),
            embedder,
            splitter: TextSplitter::new(splitter),
            loader: CorpusLoader::new(max_file_size),
            write_lock: Mutex::new(()),
            current: RwLock::new(None),
            state_tx,
        })
    }

    /// Load the persisted index, or build one from the corpus.
    ///
    /// A persisted index that fails to load, or that was built from a different
    /// set of corpus files than the ones now present, is logged and rebuilt.
    ///
    /// # Errors
    ///
    /// Returns an error if a required build fails.
    pub async fn open(&self) -> Result<OpenOutcome> {
        let _guard = self.write_lock.lock().await;

        if !self.storage.exists().await {
            tracing::info!("no persisted index, building from corpus");
            let (_, report) = self.rebuild_locked().await?;
            return Ok(OpenOutcome::Built(report));
        }

        match self
            .storage
            .load(self.embedder.model(), self.embedder.dimension())
            .await
        {
            Ok(index) => {
                if let Some(reason) = self.corpus_drift().await? {
                    tracing::warn!(%reason, "persisted index is stale, rebuilding");
                    let (_, report) = self.rebuild_locked().await?;
                    return Ok(OpenOutcome::Rebuilt { reason, report });
                }
                let chunks = index.len();
                self.install(Arc::new(index));
                Ok(OpenOutcome::Loaded { chunks })
            }
            Err(e) => {
                tracing::warn!(error = %e, "persisted index unusable, rebuilding");
                let (_, report) = self.rebuild_locked().await?;
                Ok(OpenOutcome::Rebuilt {
                    reason: e.reason,
                    report,
                })
            }
        }
    }

    /// Rebuild the whole index from the corpus and persist it.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or persistence fails. The previous index
    /// and state are kept.
    pub async fn rebuild(&self) -> Result<IndexReport> {
        let _guard = self.write_lock.lock().await;
        let (_, report) = self.rebuild_locked().await?;
        Ok(report)
    }

    /// Copy `paths` into the corpus and rebuild.
    ///
    /// If a copy fails, files already copied by this call are removed again.
    ///
    /// # Errors
    ///
    /// Returns an error if a copy or the rebuild fails.
    pub async fn add_documents(
        &self,
        paths: &[PathBuf],
    ) -> Result<(Vec<DocumentId>, IndexReport)> {
        let _guard = self.write_lock.lock().await;

        let mut added = Vec::with_capacity(paths.len());
        for path in paths {
            match self.corpus.add_file(path).await {
                Ok(id) => added.push(id),
                Err(e) => {
                    for id in &added {
                        let _ = tokio::fs::remove_file(self.corpus.dir().join(id.as_str())).await;
                    }
                    return Err(e);
                }
            }
        }

        let (_, report) = self.rebuild_locked().await?;
        Ok((added, report))
    }

    /// The live index. Waits for a running build; builds if no index exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a triggered build fails.
    pub async fn snapshot(&self) -> Result<Arc<VectorIndex>> {
        if self.state() == IndexState::Ready
            && let Some(index) = self.current()
        {
            return Ok(index);
        }

        // Builders hold the write lock, so acquiring it waits out any build in progress.
        let _guard = self.write_lock.lock().await;
        if self.state() == IndexState::Ready
            && let Some(index) = self.current()
        {
            return Ok(index);
        }

        tracing::info!(state = %self.state(), "no ready index, building from corpus");
        let (index, _) = self.rebuild_locked().await?;
        Ok(index)
    }

    /// Delete corpus files, the persisted index and optionally the history log.
    ///
    /// # Errors
    ///
    /// Returns an error if a deletion fails. The in-memory index is dropped
    /// regardless.
    pub async fn clear(&self, include_history: bool) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.set_state(IndexState::Cleared);

        let result = self.clear_files(include_history).await;
        self.set_state(IndexState::Absent);
        result
    }

    async fn clear_files(&self, include_history: bool) -> Result<()> {
        self.corpus.clear().await?;
        self.storage.remove().await?;
        if include_history {
            self.history.clear().await?;
        }
        tracing::info!(include_history, "index cleared");
        Ok(())
    }

    #[must_use]
    pub fn state(&self) -> IndexState {
        *self.state_tx.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<IndexState> {
        self.state_tx.subscribe()
    }

    /// The live index without waiting, if any.
    #[must_use]
    pub fn current(&self) -> Option<Arc<VectorIndex>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    #[must_use]
    pub fn storage(&self) -> &IndexStorage {
        &self.storage
    }

    #[must_use]
    pub fn history(&self) -> &QueryHistory {
        &self.history
    }

    #[must_use]
    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    /// Describe how the corpus differs from the files the persisted index was built from.
    async fn corpus_drift(&self) -> Result<Option<String>> {
        let indexed = match self.storage.meta().await {
            Ok(meta) => meta.source_files,
            Err(e) => return Ok(Some(e.reason)),
        };
        let present = self.corpus.list().await?;
        if indexed == present {
            return Ok(None);
        }
        let added = present.iter().filter(|id| !indexed.contains(id)).count();
        let removed = indexed.iter().filter(|id| !present.contains(id)).count();
        Ok(Some(format!("corpus changed: {added} added, {removed} removed")))
    }

    fn set_state(&self, state: IndexState) {
        let prev = self.state_tx.send_replace(state);
        if prev != state {
            tracing::debug!(from = %prev, to = %state, "index state changed");
        }
    }

    fn install(&self, index: Arc<VectorIndex>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(index);
        self.set_state(IndexState::Ready);
    }

    /// Caller must hold `write_lock`.
    async fn rebuild_locked(&self) -> Result<(Arc<VectorIndex>, IndexReport)> {
        let prev_state = self.state();
        let building = if self.current().is_some() {
            IndexState::Rebuilding
        } else {
            IndexState::Building
        };
        self.set_state(building);

        match self.build_and_persist().await {
            Ok((index, report)) => {
                let index = Arc::new(index);
                self.install(Arc::clone(&index));
                Ok((index, report))
            }
            Err(e) => {
                tracing::warn!(error = %e, "index build failed, keeping previous index");
                self.set_state(prev_state);
                Err(e)
            }
        }
    }

    async fn build_and_persist(&self) -> Result<(VectorIndex, IndexReport)> {
        let start = Instant::now();
        let load = self.loader.load(self.corpus.dir()).await?;

        let mut report = IndexReport {
            files_scanned: load.scanned.len(),
            warnings: load.warnings,
            ..IndexReport::default()
        };
        let total = load.documents.len();
        tracing::info!(total, "indexing started");

        let mut chunks = Vec::new();
        for (i, doc) in load.documents.iter().enumerate() {
            let pieces = self.splitter.split(doc);
            let created = pieces.len();
            for piece in pieces {
                let vector = self.embedder.embed(&piece.content).await?;
                chunks.push(IndexedChunk::new(piece, vector));
            }
            report.documents_indexed += 1;
            report.chunks_created += created;
            tracing::debug!(
                file = %doc.metadata.file_name,
                progress = format_args!("{}/{total}", i + 1),
                chunks = created,
            );
        }

        let index = VectorIndex::build(
            chunks,
            self.embedder.dimension(),
            self.embedder.model(),
        )?;
        self.storage.persist(&index, &load.scanned).await?;

        report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        tracing::info!(
            documents = report.documents_indexed,
            chunks = report.chunks_created,
            warnings = report.warnings.len(),
            duration_ms = report.duration_ms,
            "index built"
        );
        Ok((index, report))
    }
}

#[cfg(test)]
mod tests {
    use docseek_llm::any::AnyProvider;
    use docseek_llm::hash::HashEmbedder;
    use docseek_llm::mock::MockProvider;

    use super::*;
    use crate::error::{EmbeddingError, IndexError};

    fn paths(dir: &tempfile::TempDir) -> IndexPaths {
        IndexPaths {
            corpus_dir: dir.path().join("documents"),
            index_dir: dir.path().join("index_storage"),
            history_file: dir.path().join("query_history.jsonl"),
        }
    }

    async fn hash_embedder(dim: usize) -> Embedder {
        Embedder::new(Arc::new(AnyProvider::from(HashEmbedder::new(dim))))
            .await
            .unwrap()
    }

    async fn manager(dir: &tempfile::TempDir) -> IndexManager {
        IndexManager::new(
            paths(dir),
            hash_embedder(64).await,
            SplitterConfig::default(),
            crate::document::DEFAULT_MAX_FILE_SIZE,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn open_empty_corpus_builds_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir).await;
        assert_eq!(manager.state(), IndexState::Absent);

        let outcome = manager.open().await.unwrap();
        assert!(matches!(outcome, OpenOutcome::Built(ref r) if r.chunks_created == 0));
        assert_eq!(manager.state(), IndexState::Ready);
        assert!(manager.current().unwrap().is_empty());
        assert!(manager.storage().exists().await);
    }

    #[tokio::test]
    async fn open_loads_persisted_index() {
        let dir = tempfile::tempdir().unwrap();
        {
            let manager = manager(&dir).await;
            manager
                .corpus()
                .add_bytes("a.txt", b"The sky is blue.")
                .await
                .unwrap();
            manager.open().await.unwrap();
        }

        let manager = manager(&dir).await;
        let outcome = manager.open().await.unwrap();
        assert!(matches!(outcome, OpenOutcome::Loaded { chunks: 1 }));
    }

    #[tokio::test]
    async fn open_rebuilds_when_model_changes() {
        let dir = tempfile::tempdir().unwrap();
        manager(&dir).await.open().await.unwrap();

        let other = IndexManager::new(
            paths(&dir),
            hash_embedder(32).await,
            SplitterConfig::default(),
            crate::document::DEFAULT_MAX_FILE_SIZE,
        )
        .await
        .unwrap();
        let outcome = other.open().await.unwrap();
        assert!(matches!(outcome, OpenOutcome::Rebuilt { .. }));
        assert_eq!(other.current().unwrap().dimension(), 32);
    }

    #[tokio::test]
    async fn add_documents_goes_through_rebuilding() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir).await;
        manager.open().await.unwrap();

        let src = dir.path().join("new.txt");
        std::fs::write(&src, "Fresh content.").unwrap();

        let mut rx = manager.subscribe();
        let (ids, report) = manager.add_documents(&[src]).await.unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(report.chunks_created, 1);
        assert_eq!(manager.state(), IndexState::Ready);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), IndexState::Ready);
    }

    #[tokio::test]
    async fn add_missing_file_rolls_back_copies() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir).await;
        manager.open().await.unwrap();

        let good = dir.path().join("good.txt");
        std::fs::write(&good, "ok").unwrap();
        let missing = dir.path().join("missing.txt");

        assert!(manager.add_documents(&[good, missing]).await.is_err());
        assert!(manager.corpus().list().await.unwrap().is_empty());
        assert_eq!(manager.state(), IndexState::Ready);
    }

    #[tokio::test]
    async fn open_rebuilds_when_file_removed_from_corpus() {
        let dir = tempfile::tempdir().unwrap();
        {
            let manager = manager(&dir).await;
            manager.corpus().add_bytes("a.txt", b"Alpha.").await.unwrap();
            manager.corpus().add_bytes("b.txt", b"Beta.").await.unwrap();
            manager.open().await.unwrap();
        }
        let first = std::fs::read_dir(dir.path().join("documents"))
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        std::fs::remove_file(first.path()).unwrap();

        let reopened = manager(&dir).await;
        let outcome = reopened.open().await.unwrap();
        assert!(matches!(
            outcome,
            OpenOutcome::Rebuilt { ref reason, .. } if reason == "corpus changed: 0 added, 1 removed"
        ));
        assert_eq!(reopened.current().unwrap().document_count(), 1);

        let again = manager(&dir).await;
        assert!(matches!(again.open().await.unwrap(), OpenOutcome::Loaded { chunks: 1 }));
    }

    #[tokio::test]
    async fn unsupported_files_do_not_force_rebuilds() {
        let dir = tempfile::tempdir().unwrap();
        {
            let manager = manager(&dir).await;
            manager.corpus().add_bytes("a.txt", b"Alpha.").await.unwrap();
            manager.corpus().add_bytes("blob.bin", b"\x00").await.unwrap();
            let outcome = manager.open().await.unwrap();
            assert!(matches!(outcome, OpenOutcome::Built(ref r) if r.warnings.len() == 1));
        }

        let manager = manager(&dir).await;
        assert!(matches!(manager.open().await.unwrap(), OpenOutcome::Loaded { chunks: 1 }));
    }

    #[tokio::test]
    async fn snapshot_builds_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir).await;
        manager
            .corpus()
            .add_bytes("a.txt", b"Hello there.")
            .await
            .unwrap();

        let index = manager.snapshot().await.unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(manager.state(), IndexState::Ready);
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir).await;
        manager.corpus().add_bytes("a.txt", b"Data.").await.unwrap();
        manager.open().await.unwrap();
        manager
            .history()
            .append(&crate::history::QueryRecord::new("q", "a"))
            .await
            .unwrap();

        manager.clear(true).await.unwrap();
        assert_eq!(manager.state(), IndexState::Absent);
        assert!(manager.current().is_none());
        assert!(manager.corpus().list().await.unwrap().is_empty());
        assert!(!manager.storage().exists().await);
        assert!(manager.history().read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_can_keep_history() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir).await;
        manager
            .history()
            .append(&crate::history::QueryRecord::new("q", "a"))
            .await
            .unwrap();

        manager.clear(false).await.unwrap();
        assert_eq!(manager.history().read_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_rebuild_keeps_previous_index() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir).await;
        manager.corpus().add_bytes("a.txt", b"One.").await.unwrap();
        manager.open().await.unwrap();
        let before = manager.current().unwrap();

        // Persisting into a path whose parent is a regular file fails.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let broken = IndexManager {
            storage: IndexStorage::new(blocker.join("index")),
            ..manager
        };
        broken.corpus().add_bytes("b.txt", b"Two.").await.unwrap();

        assert!(broken.rebuild().await.is_err());
        assert_eq!(broken.state(), IndexState::Ready);
        assert!(Arc::ptr_eq(&broken.current().unwrap(), &before));
    }

    #[tokio::test]
    async fn embedding_failure_aborts_build() {
        let dir = tempfile::tempdir().unwrap();
        // Vectors from this provider do not match the dimension the embedder expects.
        let wrong = Arc::new(AnyProvider::from(
            MockProvider::default().with_embedding(vec![1.0, 0.0, 0.0]),
        ));
        let manager = IndexManager::new(
            paths(&dir),
            Embedder::with_probed(wrong, 2, "mock-embedding"),
            SplitterConfig::default(),
            crate::document::DEFAULT_MAX_FILE_SIZE,
        )
        .await
        .unwrap();
        manager.corpus().add_bytes("a.txt", b"Text.").await.unwrap();

        let err = manager.open().await.unwrap_err();
        assert!(matches!(
            err,
            IndexError::Embedding(EmbeddingError::DimensionMismatch { .. })
        ));
        assert_eq!(manager.state(), IndexState::Absent);
        assert!(!manager.storage().exists().await);
    }
}
