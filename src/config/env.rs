use super::{Config, EmbeddingBackend};

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DOCSEEK_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("DOCSEEK_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("DOCSEEK_LLM_TIMEOUT") {
            if let Ok(secs) = v.parse::<u64>() {
                self.llm.timeout_secs = secs;
            } else {
                tracing::warn!("ignoring invalid DOCSEEK_LLM_TIMEOUT value: {v}");
            }
        }
        if let Ok(v) = std::env::var("DOCSEEK_EMBEDDING_BACKEND") {
            if let Ok(backend) =
                serde_json::from_value::<EmbeddingBackend>(serde_json::Value::String(v.clone()))
            {
                self.llm.embedding_backend = backend;
            } else {
                tracing::warn!("ignoring invalid DOCSEEK_EMBEDDING_BACKEND value: {v}");
            }
        }
        if let Ok(v) = std::env::var("DOCSEEK_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Ok(v) = std::env::var("DOCSEEK_CORPUS_DIR") {
            self.storage.corpus_dir = v.into();
        }
        if let Ok(v) = std::env::var("DOCSEEK_INDEX_DIR") {
            self.storage.index_dir = v.into();
        }
        if let Ok(v) = std::env::var("DOCSEEK_HISTORY_FILE") {
            self.storage.history_file = v.into();
        }
        if let Ok(v) = std::env::var("DOCSEEK_TOP_K") {
            if let Ok(k) = v.parse::<usize>() {
                self.retrieval.top_k = k;
            } else {
                tracing::warn!("ignoring invalid DOCSEEK_TOP_K value: {v}");
            }
        }
    }
}
