use std::io::Read;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;
use zip::ZipArchive;

use super::super::{DEFAULT_MAX_FILE_SIZE, Document, DocumentFormat, LoadError};
use super::{DocumentLoader, LoadFuture, checked_path};

const DOCUMENT_PART: &str = "word/document.xml";

pub struct DocxLoader {
    pub max_file_size: u64,
}

impl Default for DocxLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl DocumentLoader for DocxLoader {
    fn load(&self, path: &Path) -> LoadFuture<'_> {
        let path = path.to_path_buf();
        let max_size = self.max_file_size;
        Box::pin(async move {
            let path = checked_path(&path, max_size).await?;

            let path_buf = path.clone();
            let content = tokio::task::spawn_blocking(move || read_docx(&path_buf, max_size))
                .await
                .map_err(|e| LoadError::Docx(format!("extraction aborted: {e}")))??;

            Ok(Document::new(path, content, DocumentFormat::Docx))
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["docx"]
    }
}

/// Decompressed `document.xml` is capped at `max_size` bytes, like the archive itself.
fn read_docx(path: &Path, max_size: u64) -> Result<String, LoadError> {
    let file = std::fs::File::open(path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| LoadError::Docx(e.to_string()))?;
    let part = archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| LoadError::Docx(format!("{DOCUMENT_PART}: {e}")))?;

    let mut bytes = Vec::new();
    part.take(max_size.saturating_add(1))
        .read_to_end(&mut bytes)?;
    let read = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
    if read > max_size {
        return Err(LoadError::FileTooLarge(read));
    }
    extract_docx_text(&String::from_utf8(bytes)?)
}

/// Extract plain text from a WordprocessingML `document.xml` body.
///
/// Text runs (`w:t`) are concatenated; each paragraph ends with a newline,
/// `w:tab` becomes a tab and `w:br`/`w:cr` a newline.
///
/// # Errors
///
/// Returns [`LoadError::Docx`] if the XML is malformed.
pub fn extract_docx_text(xml: &str) -> Result<String, LoadError> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_text = true,
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => out.push('\t'),
                b"w:br" | b"w:cr" | b"w:p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let text = t.unescape().map_err(|e| LoadError::Docx(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(LoadError::Docx(format!(
                    "malformed XML at {}: {e}",
                    reader.buffer_position()
                )));
            }
            Ok(_) => {}
        }
    }

    Ok(out)
}
