//! Append-only question/answer log stored as JSON lines.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::Result;

pub const EMPTY_HISTORY_MESSAGE: &str = "There is no question history yet.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub timestamp: DateTime<Utc>,
    pub question: String,
    pub answer: String,
}

impl QueryRecord {
    #[must_use]
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            question: question.into(),
            answer: answer.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryHistory {
    path: PathBuf,
}

impl QueryHistory {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// # Errors
    ///
    /// Returns an error if the log file cannot be opened or written.
    pub async fn append(&self, record: &QueryRecord) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// All records in append order. A missing log is empty; malformed lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the log exists but cannot be read.
    pub async fn read_all(&self) -> Result<Vec<QueryRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        line = lineno + 1,
                        error = %e,
                        "skipping malformed history entry"
                    );
                }
            }
        }
        Ok(records)
    }

    /// # Errors
    ///
    /// Returns an error if the log exists but cannot be removed.
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Human-readable log, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    pub async fn render(&self) -> Result<String> {
        Ok(render_records(&self.read_all().await?))
    }
}

#[must_use]
pub fn render_records(records: &[QueryRecord]) -> String {
    if records.is_empty() {
        return EMPTY_HISTORY_MESSAGE.to_owned();
    }
    let mut out = String::new();
    for r in records {
        let _ = write!(
            out,
            "{} - Q: {}\nA: {}\n\n",
            r.timestamp.format("%Y-%m-%d %H:%M:%S"),
            r.question,
            r.answer
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let history = QueryHistory::new(dir.path().join("query_history.jsonl"));
        assert!(history.read_all().await.unwrap().is_empty());
        assert_eq!(history.render().await.unwrap(), EMPTY_HISTORY_MESSAGE);
    }

    #[tokio::test]
    async fn append_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let history = QueryHistory::new(dir.path().join("nested").join("history.jsonl"));
        history.append(&QueryRecord::new("q1", "a1")).await.unwrap();
        history.append(&QueryRecord::new("q2", "a2")).await.unwrap();

        let records = history.read_all().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].question, "q1");
        assert_eq!(records[1].answer, "a2");
    }

    #[tokio::test]
    async fn multiline_answers_survive() {
        let dir = tempfile::tempdir().unwrap();
        let history = QueryHistory::new(dir.path().join("h.jsonl"));
        history
            .append(&QueryRecord::new("why?", "line one\nline two"))
            .await
            .unwrap();
        let records = history.read_all().await.unwrap();
        assert_eq!(records[0].answer, "line one\nline two");
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h.jsonl");
        let history = QueryHistory::new(&path);
        history.append(&QueryRecord::new("q1", "a1")).await.unwrap();
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{broken\n\n");
        std::fs::write(&path, content).unwrap();
        history.append(&QueryRecord::new("q2", "a2")).await.unwrap();

        let records = history.read_all().await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn clear_removes_log() {
        let dir = tempfile::tempdir().unwrap();
        let history = QueryHistory::new(dir.path().join("h.jsonl"));
        history.append(&QueryRecord::new("q", "a")).await.unwrap();
        history.clear().await.unwrap();
        assert!(history.read_all().await.unwrap().is_empty());
        history.clear().await.unwrap();
    }

    #[test]
    fn render_format() {
        let record = QueryRecord {
            timestamp: DateTime::parse_from_rfc3339("2024-05-01T12:30:00Z")
                .unwrap()
                .with_timezone(&Utc),
            question: "What color is the sky?".into(),
            answer: "Blue.".into(),
        };
        assert_eq!(
            render_records(&[record]),
            "2024-05-01 12:30:00 - Q: What color is the sky?\nA: Blue.\n\n"
        );
    }
}
