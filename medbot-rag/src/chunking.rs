//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`RecursiveChunker`], which
//! splits text hierarchically by a prioritized list of separators (paragraphs,
//! lines, sentences, words, and finally single characters) and then merges the
//! resulting pieces into overlapping windows.
//!
//! Chunks are exact substrings of the source text: separators stay attached to
//! the piece they terminate and no whitespace is trimmed, so dropping the
//! overlap and concatenating the chunks of a document reproduces it byte for
//! byte.

use std::collections::VecDeque;

use crate::config::RagConfig;
use crate::document::{CHUNK_INDEX_KEY, Chunk, Document};

/// Separators tried by [`RecursiveChunker`] by default, coarsest first.
///
/// The trailing empty separator cuts at character boundaries, so with the
/// default list no chunk ever exceeds the configured size.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", " ", ""];

/// A strategy for splitting documents into chunks.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;

    /// Split a batch of documents, preserving document order.
    fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        documents.iter().flat_map(|document| self.chunk(document)).collect()
    }
}

/// Splits text recursively by separators, then merges pieces into overlapping windows.
///
/// Chunk IDs are generated as `{document_id}_{chunk_index}`. Each chunk inherits
/// the parent document's metadata plus a `chunk_index` field.
///
/// # Example
///
/// ```rust,ignore
/// use medbot_rag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(500, 50);
/// let chunks = chunker.split_documents(&documents);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker` using [`DEFAULT_SEPARATORS`].
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: maximum number of characters shared by consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Create a chunker from a validated [`RagConfig`].
    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Replace the separator list (coarsest first).
    ///
    /// Omitting the empty separator means a piece with no split point is kept
    /// whole even when it exceeds `chunk_size`.
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    /// Byte ranges of the chunks `text` would be split into.
    fn windows(&self, text: &str) -> Vec<(usize, usize)> {
        let mut spans = Vec::new();
        split_spans(text, 0, self.chunk_size, &self.separators, &mut spans);
        merge_spans(&spans, self.chunk_size, self.chunk_overlap)
    }
}

/// A contiguous piece of the source text that is never cut further.
#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
    chars: usize,
}

/// Partition `text` into spans of at most `chunk_size` characters, trying
/// separators coarsest first. `offset` is the byte offset of `text` in the document.
fn split_spans(
    text: &str,
    offset: usize,
    chunk_size: usize,
    separators: &[String],
    out: &mut Vec<Span>,
) {
    if text.is_empty() {
        return;
    }
    let chars = text.chars().count();
    if chars <= chunk_size {
        out.push(Span { start: offset, end: offset + text.len(), chars });
        return;
    }

    let Some((separator, finer)) = separators.split_first() else {
        // No split point left: the piece propagates oversized.
        out.push(Span { start: offset, end: offset + text.len(), chars });
        return;
    };

    if separator.is_empty() {
        split_by_chars(text, offset, chunk_size, out);
        return;
    }

    if !text.contains(separator.as_str()) {
        split_spans(text, offset, chunk_size, finer, out);
        return;
    }

    let mut start = 0;
    for piece in text.split_inclusive(separator.as_str()) {
        split_spans(piece, offset + start, chunk_size, finer, out);
        start += piece.len();
    }
}

/// Cut `text` every `chunk_size` characters.
fn split_by_chars(text: &str, offset: usize, chunk_size: usize, out: &mut Vec<Span>) {
    let mut piece_start = 0;
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == chunk_size {
            out.push(Span { start: offset + piece_start, end: offset + idx, chars: count });
            piece_start = idx;
            count = 0;
        }
        count += 1;
    }
    if count > 0 {
        out.push(Span { start: offset + piece_start, end: offset + text.len(), chars: count });
    }
}

/// Merge consecutive spans into windows of at most `chunk_size` characters.
///
/// When a window is emitted, the spans that start the next one are the longest
/// suffix of it whose length is at most `chunk_overlap` and which still leaves
/// room for the incoming span.
fn merge_spans(spans: &[Span], chunk_size: usize, chunk_overlap: usize) -> Vec<(usize, usize)> {
    let mut windows = Vec::new();
    let mut current: VecDeque<Span> = VecDeque::new();
    let mut total = 0;

    for &span in spans {
        if total + span.chars > chunk_size {
            if let (Some(first), Some(last)) = (current.front(), current.back()) {
                windows.push((first.start, last.end));
            }
            while total > 0 && (total > chunk_overlap || total + span.chars > chunk_size) {
                match current.pop_front() {
                    Some(dropped) => total -= dropped.chars,
                    None => break,
                }
            }
        }
        current.push_back(span);
        total += span.chars;
    }

    if let (Some(first), Some(last)) = (current.front(), current.back()) {
        windows.push((first.start, last.end));
    }
    windows
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.text.is_empty() {
            return Vec::new();
        }

        self.windows(&document.text)
            .into_iter()
            .enumerate()
            .map(|(i, (start, end))| {
                let mut metadata = document.metadata.clone();
                metadata.insert(CHUNK_INDEX_KEY.to_string(), i.to_string());
                Chunk {
                    id: format!("{}_{i}", document.id),
                    text: document.text[start..end].to_string(),
                    metadata,
                    document_id: document.id.clone(),
                    start_offset: start,
                }
            })
            .collect()
    }
}
