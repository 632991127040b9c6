mod env;
mod types;


pub use types::*;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use docseek_index::document::SplitterConfig;
use docseek_index::manager::IndexPaths;
use docseek_index::query;

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.index.chunk_size == 0 {
            bail!("index.chunk_size must be greater than 0");
        }
        if self.index.chunk_overlap >= self.index.chunk_size {
            bail!(
                "index.chunk_overlap ({}) must be smaller than index.chunk_size ({})",
                self.index.chunk_overlap,
                self.index.chunk_size
            );
        }
        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be greater than 0");
        }
        if self.llm.timeout_secs == 0 {
            bail!("llm.timeout_secs must be greater than 0");
        }
        Ok(())
    }

    #[must_use]
    pub fn splitter_config(&self) -> SplitterConfig {
        SplitterConfig {
            chunk_size: self.index.chunk_size,
            chunk_overlap: self.index.chunk_overlap,
            sentence_aware: self.index.sentence_aware,
        }
    }

    #[must_use]
    pub fn index_paths(&self) -> IndexPaths {
        IndexPaths {
            corpus_dir: self.storage.corpus_dir.clone(),
            index_dir: self.storage.index_dir.clone(),
            history_file: self.storage.history_file.clone(),
        }
    }

    #[must_use]
    pub fn query_config(&self) -> query::RetrievalConfig {
        query::RetrievalConfig {
            top_k: self.retrieval.top_k,
            timeout: Duration::from_secs(self.llm.timeout_secs),
            preview_chars: self.retrieval.preview_chars,
        }
    }
}

/// `--config`, then `DOCSEEK_CONFIG`, then `config/default.toml`.
#[must_use]
pub fn resolve_config_path(cli: Option<PathBuf>) -> PathBuf {
    if let Some(path) = cli {
        return path;
    }
    if let Ok(path) = std::env::var("DOCSEEK_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}
