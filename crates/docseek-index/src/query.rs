//! Question answering: embed, retrieve, prompt the language model, log.

use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

use docseek_llm::LlmProvider;
use docseek_llm::provider::Message;
use quick_xml::escape::escape;

use crate::error::{GenerationError, Result};
use crate::history::{QueryHistory, QueryRecord};
use crate::manager::IndexManager;
use crate::store::ScoredChunk;

pub const SYSTEM_PROMPT: &str = "You answer questions about the user's documents. \
Use only the information in the provided context. If the context does not contain \
the answer, say that no relevant information was found in the documents.";

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub timeout: Duration,
    /// Characters of each source shown in previews.
    pub preview_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 2,
            timeout: Duration::from_secs(120),
            preview_chars: 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub question: String,
    pub text: String,
    pub sources: Vec<ScoredChunk>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourcePreview {
    pub file_name: String,
    pub score: f32,
    pub preview: String,
}

impl Answer {
    /// Sources truncated to `limit` characters each.
    #[must_use]
    pub fn source_previews(&self, limit: usize) -> Vec<SourcePreview> {
        self.sources
            .iter()
            .map(|s| SourcePreview {
                file_name: s.metadata.file_name.clone(),
                score: s.score,
                preview: s.content.chars().take(limit).collect(),
            })
            .collect()
    }
}

pub struct QueryEngine<P: LlmProvider> {
    manager: Arc<IndexManager>,
    llm: Arc<P>,
    history: QueryHistory,
    config: RetrievalConfig,
}

impl<P: LlmProvider> QueryEngine<P> {
    #[must_use]
    pub fn new(manager: Arc<IndexManager>, llm: Arc<P>, config: RetrievalConfig) -> Self {
        let history = manager.history().clone();
        Self {
            manager,
            llm,
            history,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Top chunks for `question` from the ready index.
    ///
    /// # Errors
    ///
    /// Returns an error if no index can be obtained or embedding fails.
    pub async fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<ScoredChunk>> {
        let index = self.manager.snapshot().await?;
        let query = self.manager.embedder().embed(question).await?;
        Ok(index.search(&query, top_k)?)
    }

    /// Answer `question` from the corpus. `top_k` defaults to the configured value.
    ///
    /// The exchange is appended to the history log only when generation succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval fails, or `GenerationError` if the language
    /// model fails, times out or returns nothing.
    pub async fn answer(&self, question: &str, top_k: Option<usize>) -> Result<Answer> {
        let top_k = top_k.unwrap_or(self.config.top_k);
        let sources = self.retrieve(question, top_k).await?;
        tracing::debug!(retrieved = sources.len(), top_k, "retrieval done");

        let messages = build_messages(question, &sources);
        let text = match tokio::time::timeout(self.config.timeout, self.llm.chat(&messages)).await
        {
            Err(_) => return Err(GenerationError::Timeout(self.config.timeout).into()),
            Ok(Err(e)) => return Err(GenerationError::Provider(e).into()),
            Ok(Ok(text)) => text,
        };

        let text = text.trim().to_owned();
        if text.is_empty() {
            return Err(GenerationError::EmptyAnswer.into());
        }

        if let Err(e) = self.history.append(&QueryRecord::new(question, &text)).await {
            tracing::warn!(error = %e, "failed to record question history");
        }

        Ok(Answer {
            question: question.to_owned(),
            text,
            sources,
        })
    }
}

/// Retrieved chunks as an XML-tagged context block. Empty input gives an empty string.
#[must_use]
pub fn format_context(sources: &[ScoredChunk]) -> String {
    if sources.is_empty() {
        return String::new();
    }

    let mut out = String::from("<context>\n");
    for chunk in sources {
        let _ = writeln!(
            out,
            "  <chunk file=\"{}\" score=\"{:.2}\">",
            escape(&chunk.metadata.file_name),
            chunk.score,
        );
        out.push_str(&chunk.content);
        out.push_str("\n  </chunk>\n");
    }
    out.push_str("</context>");
    out
}

#[must_use]
pub fn build_messages(question: &str, sources: &[ScoredChunk]) -> Vec<Message> {
    let context = format_context(sources);
    let user = if context.is_empty() {
        format!("No document context is available.\n\nQuestion: {question}")
    } else {
        format!("{context}\n\nQuestion: {question}")
    };
    vec![Message::system(SYSTEM_PROMPT), Message::user(user)]
}
