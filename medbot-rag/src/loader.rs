//! Document sources for ingestion.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use globset::{Glob, GlobMatcher};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::document::{Document, PAGE_KEY, SOURCE_KEY};
use crate::error::{RagError, Result};

/// Default pattern for [`DirectoryLoader`]: every PDF and `.txt` file at any depth.
pub const DEFAULT_GLOB: &str = "**/*.{pdf,txt}";

/// Page separator inside extracted text files (as written by `pdftotext`).
const PAGE_BREAK: char = '\u{c}';

/// Supplies the documents of a corpus.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Load every document of the corpus.
    async fn load(&self) -> Result<Vec<Document>>;
}

/// Loads PDF and UTF-8 text files under a directory that match a glob pattern.
///
/// Files are visited in sorted path order and every page becomes one
/// [`Document`] with `source` (the path relative to the root) and `page`
/// (1-based) metadata. PDF pages come from the PDF's own page tree; text files
/// are split on form feeds. Blank pages are skipped but keep their number.
///
/// Discovery and extraction are blocking, so [`load`](DocumentSource::load)
/// runs them on the blocking thread pool.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
    pattern: String,
    matcher: GlobMatcher,
}

impl DirectoryLoader {
    /// Create a loader for `root` matching relative file paths against `pattern`
    /// (for example [`DEFAULT_GLOB`]).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `pattern` is not a valid glob.
    pub fn new(root: impl Into<PathBuf>, pattern: &str) -> Result<Self> {
        let matcher = Glob::new(pattern)
            .map_err(|e| RagError::ConfigError(format!("invalid glob '{pattern}': {e}")))?
            .compile_matcher();
        Ok(Self { root: root.into(), pattern: pattern.to_string(), matcher })
    }

    /// Paths of the files this loader would read, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::LoaderError`] if the root is not a directory.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Err(RagError::LoaderError {
                path: self.root.clone(),
                message: "corpus root is not a directory".to_string(),
            });
        }

        let mut files = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry.path().strip_prefix(&self.root).is_ok_and(|rel| self.matcher.is_match(rel))
            })
            .map(|entry| entry.into_path())
            .collect::<Vec<_>>();

        files.sort();
        Ok(files)
    }

    fn load_blocking(&self) -> Result<Vec<Document>> {
        let mut documents = Vec::new();
        let files = self.discover()?;
        for path in &files {
            let pages = self.read_documents(path)?;
            debug!(path = %path.display(), pages = pages.len(), "loaded file");
            documents.extend(pages);
        }
        info!(
            root = %self.root.display(),
            pattern = %self.pattern,
            files = files.len(),
            document_count = documents.len(),
            "loaded corpus"
        );
        Ok(documents)
    }

    fn read_documents(&self, path: &Path) -> Result<Vec<Document>> {
        let pages = if is_pdf(path) { read_pdf_pages(path)? } else { read_text_pages(path)? };
        let relative = path.strip_prefix(&self.root).unwrap_or(path).display().to_string();

        Ok(pages
            .into_iter()
            .enumerate()
            .filter(|(_, page)| !page.trim().is_empty())
            .map(|(i, page)| {
                let number = (i + 1).to_string();
                Document::new(format!("{relative}#page={number}"), page)
                    .with_metadata(SOURCE_KEY, relative.clone())
                    .with_metadata(PAGE_KEY, number)
            })
            .collect())
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

fn read_pdf_pages(path: &Path) -> Result<Vec<String>> {
    let pages = pdf_extract::extract_text_by_pages(path).map_err(|e| RagError::LoaderError {
        path: path.to_path_buf(),
        message: format!("PDF extraction error: {e}"),
    })?;
    if pages.iter().all(|page| page.trim().is_empty()) {
        warn!(path = %path.display(), "PDF contains no extractable text");
    }
    Ok(pages)
}

fn read_text_pages(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .map_err(|e| RagError::LoaderError { path: path.to_path_buf(), message: e.to_string() })?;
    Ok(text.split(PAGE_BREAK).map(str::to_string).collect())
}

#[async_trait]
impl DocumentSource for DirectoryLoader {
    async fn load(&self) -> Result<Vec<Document>> {
        let loader = self.clone();
        tokio::task::spawn_blocking(move || loader.load_blocking()).await.map_err(|e| {
            RagError::LoaderError {
                path: self.root.clone(),
                message: format!("loader task failed: {e}"),
            }
        })?
    }
}

/// A fixed in-memory corpus.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    documents: Vec<Document>,
}

impl StaticSource {
    /// Wrap an existing list of documents.
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl DocumentSource for StaticSource {
    async fn load(&self) -> Result<Vec<Document>> {
        Ok(self.documents.clone())
    }
}
