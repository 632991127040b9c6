use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Corpus file name of a document: a random UUID, `_`, then the original file name.
///
/// Files placed in the corpus by other means keep their name as-is.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    #[must_use]
    pub fn generate(original_name: &str) -> Self {
        Self(format!("{}_{}", Uuid::new_v4(), sanitize_file_name(original_name)))
    }

    #[must_use]
    pub fn from_file_name(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Original file name with the collision-avoidance prefix removed.
    #[must_use]
    pub fn display_name(&self) -> &str {
        match self.0.split_once('_') {
            Some((prefix, rest)) if !rest.is_empty() && Uuid::parse_str(prefix).is_ok() => rest,
            _ => &self.0,
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    if base.is_empty() || base == "." || base == ".." {
        "document".to_owned()
    } else {
        base.to_owned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Text,
    Markdown,
    Pdf,
    Docx,
}

impl DocumentFormat {
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Text => "text/plain",
            Self::Markdown => "text/markdown",
            Self::Pdf => "application/pdf",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Corpus file name (the document id).
    pub source: String,
    /// Name shown to users.
    pub file_name: String,
    pub format: DocumentFormat,
}

#[derive(Debug, Clone)]
pub struct Document {
    pub id: DocumentId,
    pub path: PathBuf,
    pub content: String,
    pub metadata: DocumentMetadata,
    pub loaded_at: DateTime<Utc>,
}

impl Document {
    #[must_use]
    pub fn new(path: PathBuf, content: String, format: DocumentFormat) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let id = DocumentId::from_file_name(file_name);
        let metadata = DocumentMetadata {
            source: id.as_str().to_owned(),
            file_name: id.display_name().to_owned(),
            format,
        };
        Self {
            id,
            path,
            content,
            metadata,
            loaded_at: Utc::now(),
        }
    }
}
