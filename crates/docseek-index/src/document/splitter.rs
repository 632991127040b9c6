use serde::{Deserialize, Serialize};

use super::types::{Document, DocumentId, DocumentMetadata};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitterConfig {
    /// Target chunk size: bytes in sentence-aware mode, chars otherwise.
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub sentence_aware: bool,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            sentence_aware: true,
        }
    }
}

/// A span of one document's text, before embedding.
///
/// `byte_range` indexes the parent document's `content`; `content` is exactly
/// that slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub document_id: DocumentId,
    pub content: String,
    pub byte_range: (usize, usize),
    pub chunk_index: usize,
    pub metadata: DocumentMetadata,
}

pub struct TextSplitter {
    config: SplitterConfig,
}

impl TextSplitter {
    #[must_use]
    pub fn new(config: SplitterConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    #[must_use]
    pub fn split(&self, document: &Document) -> Vec<TextChunk> {
        let text = &document.content;
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chunk_size = self.config.chunk_size.max(1);
        let spans = if self.config.sentence_aware {
            let pieces: Vec<(usize, usize)> = split_sentences(text)
                .into_iter()
                .flat_map(|span| hard_split(text, span, chunk_size))
                .collect();
            merge_sentences(&pieces, chunk_size, self.config.chunk_overlap)
        } else {
            split_chars(text, chunk_size, self.config.chunk_overlap)
        };

        spans
            .into_iter()
            .filter_map(|span| trim_span(text, span))
            .enumerate()
            .map(|(i, (start, end))| TextChunk {
                document_id: document.id.clone(),
                content: text[start..end].to_owned(),
                byte_range: (start, end),
                chunk_index: i,
                metadata: document.metadata.clone(),
            })
            .collect()
    }
}

/// Sentence spans: break after `.`, `?` or `!` followed by whitespace, and after
/// blank-line paragraph breaks. Whitespace-only pieces are folded into the next
/// sentence, so consecutive spans are contiguous.
fn split_sentences(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let end = i + c.len_utf8();
        let boundary = match c {
            '\n' if matches!(chars.peek(), Some((_, '\n'))) => {
                chars.next();
                Some(end + 1)
            }
            '.' | '?' | '!' if chars.peek().is_some_and(|(_, n)| n.is_whitespace()) => Some(end),
            _ => None,
        };

        if let Some(end) = boundary
            && !text[start..end].trim().is_empty()
        {
            spans.push((start, end));
            start = end;
        }
    }

    if start < text.len() {
        spans.push((start, text.len()));
    }

    spans
}

/// Split a span longer than `max_len` bytes at char boundaries.
fn hard_split(text: &str, (start, end): (usize, usize), max_len: usize) -> Vec<(usize, usize)> {
    if end - start <= max_len {
        return vec![(start, end)];
    }

    let mut pieces = Vec::new();
    let mut piece_start = start;
    for (offset, c) in text[start..end].char_indices() {
        let pos = start + offset;
        if pos > piece_start && pos + c.len_utf8() - piece_start > max_len {
            pieces.push((piece_start, pos));
            piece_start = pos;
        }
    }
    pieces.push((piece_start, end));
    pieces
}

/// Merge contiguous sentence spans into chunks, respecting size and overlap.
fn merge_sentences(
    sentences: &[(usize, usize)],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<(usize, usize)> {
    let len = |i: usize| sentences[i].1 - sentences[i].0;
    let mut chunks = Vec::new();
    let mut current_len = 0;
    // Sliding window: index of the first sentence contributing to the current chunk.
    let mut window_start = 0;

    for idx in 0..sentences.len() {
        if current_len > 0 && current_len + len(idx) > chunk_size {
            chunks.push((sentences[window_start].0, sentences[idx - 1].1));

            // Carry trailing sentences of the finished chunk as overlap.
            let mut overlap_len = 0;
            let mut overlap_start = idx;
            for i in (window_start..idx).rev() {
                if overlap_len + len(i) > chunk_overlap {
                    break;
                }
                overlap_len += len(i);
                overlap_start = i;
            }
            window_start = overlap_start;
            current_len = overlap_len;
        }

        current_len += len(idx);
    }

    if current_len > 0 {
        chunks.push((sentences[window_start].0, sentences[sentences.len() - 1].1));
    }

    chunks
}

fn split_chars(text: &str, chunk_size: usize, overlap: usize) -> Vec<(usize, usize)> {
    let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let char_count = bounds.len();
    bounds.push(text.len());

    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut spans = Vec::new();
    let mut start = 0;

    while start < char_count {
        let end = (start + chunk_size).min(char_count);
        spans.push((bounds[start], bounds[end]));
        if end == char_count {
            break;
        }
        start += step;
    }

    spans
}

fn trim_span(text: &str, (start, end): (usize, usize)) -> Option<(usize, usize)> {
    let slice = &text[start..end];
    let trimmed = slice.trim_start();
    let lead = slice.len() - trimmed.len();
    let trimmed = trimmed.trim_end();
    if trimmed.is_empty() {
        return None;
    }
    Some((start + lead, start + lead + trimmed.len()))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::document::types::DocumentFormat;

    fn make_doc(content: &str) -> Document {
        Document::new(
            PathBuf::from("test.txt"),
            content.to_owned(),
            DocumentFormat::Text,
        )
    }

    fn splitter(chunk_size: usize, chunk_overlap: usize, sentence_aware: bool) -> TextSplitter {
        TextSplitter::new(SplitterConfig {
            chunk_size,
            chunk_overlap,
            sentence_aware,
        })
    }

    #[test]
    fn empty_document() {
        let chunks = TextSplitter::new(SplitterConfig::default()).split(&make_doc(""));
        assert!(chunks.is_empty());
    }

    #[test]
    fn whitespace_only_document() {
        let chunks = TextSplitter::new(SplitterConfig::default()).split(&make_doc(" \n\n\t "));
        assert!(chunks.is_empty());
    }

    #[test]
    fn single_small_chunk() {
        let chunks = TextSplitter::new(SplitterConfig::default()).split(&make_doc("Hello world."));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].content, "Hello world.");
        assert_eq!(chunks[0].byte_range, (0, 12));
    }

    #[test]
    fn sentence_aware_splitting() {
        let text = "First sentence. Second sentence. Third sentence.";
        let chunks = splitter(20, 5, true).split(&make_doc(text));
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
        }
    }

    #[test]
    fn ranges_point_at_content() {
        let text = "  Alpha one. Beta two!\n\nGamma three? Delta four.  ";
        let chunks = splitter(15, 0, true).split(&make_doc(text));
        for chunk in &chunks {
            let (start, end) = chunk.byte_range;
            assert_eq!(&text[start..end], chunk.content);
        }
    }

    #[test]
    fn char_splitting_with_overlap() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = splitter(10, 3, false).split(&make_doc(text));
        assert!(chunks.len() > 1);
        assert_eq!(&chunks[0].content[7..10], &chunks[1].content[..3]);
    }

    #[test]
    fn metadata_preserved() {
        let chunks = TextSplitter::new(SplitterConfig::default()).split(&make_doc("Some content."));
        assert_eq!(chunks[0].metadata.file_name, "test.txt");
        assert_eq!(chunks[0].document_id.as_str(), "test.txt");
    }

    #[test]
    fn paragraph_break_splitting() {
        let spans = split_sentences("First paragraph\n\nSecond paragraph");
        assert_eq!(spans.len(), 2);
    }

    #[test]
    fn question_and_exclamation_split() {
        assert_eq!(split_sentences("Is this a question? Yes it is.").len(), 2);
        assert_eq!(split_sentences("Wow! Amazing.").len(), 2);
    }

    #[test]
    fn decimal_point_does_not_split() {
        assert_eq!(split_sentences("Pi is 3.14 roughly.").len(), 1);
    }

    #[test]
    fn long_sentence_is_hard_split() {
        let text = "x".repeat(95);
        let chunks = splitter(30, 0, true).split(&make_doc(&text));
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.content.len() <= 30));
    }

    #[test]
    fn hard_split_respects_char_boundaries() {
        let text = "ééééé";
        let pieces = hard_split(text, (0, text.len()), 3);
        for (start, end) in pieces {
            assert!(text.is_char_boundary(start) && text.is_char_boundary(end));
        }
    }

    #[test]
    fn char_split_no_overlap() {
        assert_eq!(split_chars("abcdefghij", 5, 0), vec![(0, 5), (5, 10)]);
    }

    #[test]
    fn char_split_full_overlap_makes_progress() {
        let spans = split_chars("abcde", 3, 3);
        assert_eq!(spans[0], (0, 3));
        assert_eq!(spans.last(), Some(&(2, 5)));
    }

    #[test]
    fn sentence_overlap_repeats_previous_sentence() {
        let text = "Aa. Bb. Cc. Dd.";
        let chunks = splitter(8, 4, true).split(&make_doc(text));
        assert!(chunks.len() > 1);
        let first_tail = chunks[0].content.rsplit(' ').next().unwrap();
        assert!(chunks[1].content.starts_with(first_tail));
    }

    #[test]
    fn document_smaller_than_chunk_size() {
        let chunks = splitter(1000, 100, true).split(&make_doc("Short text."));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Short text.");
    }

    mod proptest_splitter {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(500))]

            #[test]
            fn split_never_panics(
                content in "\\PC{0,3000}",
                chunk_size in 1usize..2000,
                chunk_overlap in 0usize..500,
                sentence_aware in proptest::bool::ANY,
            ) {
                let _ = splitter(chunk_size, chunk_overlap, sentence_aware).split(&make_doc(&content));
            }

            #[test]
            fn ranges_always_match_content(
                content in "[a-zé .!?\n]{0,800}",
                chunk_size in 1usize..200,
                chunk_overlap in 0usize..50,
                sentence_aware in proptest::bool::ANY,
            ) {
                let chunks = splitter(chunk_size, chunk_overlap, sentence_aware).split(&make_doc(&content));
                for (i, chunk) in chunks.iter().enumerate() {
                    prop_assert_eq!(chunk.chunk_index, i);
                    prop_assert!(!chunk.content.trim().is_empty());
                    let (start, end) = chunk.byte_range;
                    prop_assert_eq!(&content[start..end], chunk.content.as_str());
                }
            }

            #[test]
            fn non_blank_content_yields_chunks(
                content in "[a-z]{1,10}[a-z .]{0,400}",
                chunk_size in 1usize..200,
                sentence_aware in proptest::bool::ANY,
            ) {
                let chunks = splitter(chunk_size, 0, sentence_aware).split(&make_doc(&content));
                prop_assert!(!chunks.is_empty());
            }

            #[test]
            fn split_is_deterministic(content in "[a-z. ]{0,500}", chunk_size in 1usize..100) {
                let s = splitter(chunk_size, chunk_size / 4, true);
                let doc = make_doc(&content);
                prop_assert_eq!(s.split(&doc), s.split(&doc));
            }
        }
    }
}
