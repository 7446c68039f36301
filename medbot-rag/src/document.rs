//! Data types for documents, chunks, search results, and answers.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Metadata key naming the origin of a document (file path, URL, ...).
pub const SOURCE_KEY: &str = "source";
/// Metadata key holding the 1-based page number of a document.
pub const PAGE_KEY: &str = "page";
/// Metadata key holding the position of a chunk within its document.
pub const CHUNK_INDEX_KEY: &str = "chunk_index";

/// A source document containing text content and metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The text content of the document.
    pub text: String,
    /// Key-value metadata associated with the document.
    pub metadata: HashMap<String, String>,
}

impl Document {
    /// Create a document with no metadata.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), metadata: HashMap::new() }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A contiguous segment of a [`Document`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier for the chunk.
    pub id: String,
    /// The text content of the chunk.
    pub text: String,
    /// Key-value metadata inherited from the parent document plus chunk-specific fields.
    pub metadata: HashMap<String, String>,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Byte offset of this chunk inside the parent document's text.
    pub start_offset: usize,
}

impl Chunk {
    /// Byte offset one past the end of this chunk inside the parent text.
    pub fn end_offset(&self) -> usize {
        self.start_offset + self.text.len()
    }

    /// A short human-readable label for the chunk's origin.
    pub fn origin(&self) -> String {
        let source = self.metadata.get(SOURCE_KEY).map(String::as_str).unwrap_or(&self.document_id);
        match self.metadata.get(PAGE_KEY) {
            Some(page) => format!("{source} (page {page})"),
            None => source.to_string(),
        }
    }
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}

/// A grounded answer with the chunks it was generated from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    /// The extracted answer text.
    pub text: String,
    /// Retrieved chunks, in retrieval order.
    pub sources: Vec<Chunk>,
}

const SNIPPET_CHARS: usize = 80;

impl Answer {
    /// The citation block shown under the answer text: `Sources:` followed by
    /// one line per chunk, or `No sources found`.
    pub fn sources_section(&self) -> String {
        if self.sources.is_empty() {
            return "No sources found".to_string();
        }
        let mut section = String::from("Sources:");
        for (i, source) in self.sources.iter().enumerate() {
            let flat = source.text.split_whitespace().collect::<Vec<_>>().join(" ");
            let snippet: String = flat.chars().take(SNIPPET_CHARS).collect();
            let ellipsis = if flat.chars().count() > SNIPPET_CHARS { "..." } else { "" };
            section.push_str(&format!(
                "\n  [{}] {}: \"{snippet}{ellipsis}\"",
                i + 1,
                source.origin()
            ));
        }
        section
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n\n{}", self.text.trim_end(), self.sources_section())
    }
}
