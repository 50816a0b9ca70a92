//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and two implementations:
//!
//! - [`SentenceChunker`] - cuts at paragraph, sentence, then word boundaries
//! - [`FixedSizeChunker`] - cuts at exactly `chunk_size` bytes
//!
//! Both cover the document without gaps. Consecutive segments share up to
//! `chunk_overlap` bytes, so dropping each segment's overlap with its
//! predecessor and concatenating yields the original text (see
//! [`reconstruct_text`]).

use crate::config::RagConfig;
use crate::document::{Document, Segment};
use crate::error::{RagError, Result};

/// Breakpoints tried in order of preference before falling back to whitespace.
const PARAGRAPH_SEPARATOR: &str = "\n\n";
const SENTENCE_SEPARATORS: [&str; 4] = [". ", "! ", "? ", "\n"];

/// A strategy for splitting documents into segments.
pub trait Chunker: Send + Sync {
    /// Split a document into ordered segments.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidInput`] if the document text is empty or the
    /// chunker's size parameters are unusable.
    fn chunk(&self, document: &Document) -> Result<Vec<Segment>>;
}

/// Splits text at natural breakpoints, falling back to hard cuts.
///
/// Within each `chunk_size` window the cut is placed after the last paragraph
/// break, else after the last sentence end, else after the last whitespace.
/// A breakpoint is only used when it keeps at least half the window and more
/// than `chunk_overlap` bytes; otherwise the window is cut hard.
///
/// # Example
///
/// ```rust
/// use ragkit_core::{Chunker, Document, SentenceChunker};
///
/// let chunker = SentenceChunker::new(32, 0);
/// let doc = Document::new("a", "First sentence here. Second sentence follows.");
/// let segments = chunker.chunk(&doc).unwrap();
/// assert_eq!(segments[0].text, "First sentence here. ");
/// ```
#[derive(Debug, Clone)]
pub struct SentenceChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl SentenceChunker {
    /// Create a new `SentenceChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` - maximum number of bytes per segment
    /// * `chunk_overlap` - number of bytes shared by consecutive segments
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size, chunk_overlap }
    }

    /// Create a chunker using the size and overlap from a [`RagConfig`].
    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }
}

impl Chunker for SentenceChunker {
    fn chunk(&self, document: &Document) -> Result<Vec<Segment>> {
        validate(document, self.chunk_size, self.chunk_overlap)?;
        let ranges = split_ranges(&document.text, self.chunk_size, self.chunk_overlap, true);
        Ok(build_segments(document, ranges))
    }
}

/// Splits text into fixed-size segments by byte count with configurable overlap.
///
/// Cuts are moved back to the nearest character boundary, so a segment may be
/// a few bytes shorter than `chunk_size` when the text is not ASCII.
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size, chunk_overlap }
    }

    /// Create a chunker using the size and overlap from a [`RagConfig`].
    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Result<Vec<Segment>> {
        validate(document, self.chunk_size, self.chunk_overlap)?;
        let ranges = split_ranges(&document.text, self.chunk_size, self.chunk_overlap, false);
        Ok(build_segments(document, ranges))
    }
}

/// Rebuild the source text from one document's segments, in index order.
///
/// Each segment contributes only the bytes past the end of its predecessor.
pub fn reconstruct_text(segments: &[Segment]) -> String {
    let mut text = String::new();
    let mut covered = 0usize;
    for segment in segments {
        let skip = covered.saturating_sub(segment.start).min(segment.text.len());
        text.push_str(&segment.text[skip..]);
        covered = covered.max(segment.end);
    }
    text
}

fn validate(document: &Document, chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::InvalidInput("chunk size must be greater than zero".to_string()));
    }
    if chunk_overlap >= chunk_size {
        return Err(RagError::InvalidInput(format!(
            "chunk overlap ({chunk_overlap}) must be less than chunk size ({chunk_size})"
        )));
    }
    if document.text.is_empty() {
        return Err(RagError::InvalidInput(format!("document '{}' has empty text", document.id)));
    }
    Ok(())
}

/// Compute the byte ranges of each segment.
fn split_ranges(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    use_breakpoints: bool,
) -> Vec<(usize, usize)> {
    let len = text.len();
    let mut ranges = Vec::new();
    let mut start = 0;

    loop {
        if start + chunk_size >= len {
            ranges.push((start, len));
            break;
        }

        let mut end = floor_char_boundary(text, start + chunk_size);
        if end <= start {
            // A single character wider than the chunk size.
            end = ceil_char_boundary(text, start + 1);
        }

        if use_breakpoints {
            let min_len = (chunk_size / 2).max(chunk_overlap + 1);
            if let Some(cut) = find_breakpoint(&text[start..end], min_len) {
                end = start + cut;
            }
        }

        ranges.push((start, end));
        if end >= len {
            break;
        }

        let mut next = ceil_char_boundary(text, end.saturating_sub(chunk_overlap));
        if next <= start {
            next = end;
        }
        start = next;
    }

    ranges
}

/// Find the preferred cut position inside `window`, at least `min_len` bytes in.
fn find_breakpoint(window: &str, min_len: usize) -> Option<usize> {
    let paragraph = window.rfind(PARAGRAPH_SEPARATOR).map(|i| i + PARAGRAPH_SEPARATOR.len());
    let sentence = SENTENCE_SEPARATORS
        .iter()
        .filter_map(|sep| window.rfind(sep).map(|i| i + sep.len()))
        .max();
    let word = window
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, c)| i + c.len_utf8());

    [paragraph, sentence, word].into_iter().flatten().find(|pos| *pos >= min_len)
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut i = index.min(text.len());
    while !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(text: &str, index: usize) -> usize {
    let mut i = index.min(text.len());
    while !text.is_char_boundary(i) {
        i += 1;
    }
    i
}

fn build_segments(document: &Document, ranges: Vec<(usize, usize)>) -> Vec<Segment> {
    ranges
        .into_iter()
        .enumerate()
        .map(|(index, (start, end))| {
            let mut metadata = document.metadata.clone();
            metadata.insert("chunk_index".to_string(), index.to_string());
            if let Some(page) = document.page {
                metadata.insert("page".to_string(), page.to_string());
            }
            if let Some(uri) = &document.source_uri {
                metadata.insert("source_uri".to_string(), uri.clone());
            }
            Segment {
                id: format!("{}_{index}", document.id),
                document_id: document.id.clone(),
                index,
                text: document.text[start..end].to_string(),
                start,
                end,
                metadata,
            }
        })
        .collect()
}
