//! Ingestion pipeline.
//!
//! The [`IngestPipeline`] turns a corpus into a persisted index by composing a
//! [`DocumentSource`], a [`Chunker`], and an [`EmbeddingProvider`]:
//! load → chunk → embed → build → save. Any failure aborts the whole run and
//! leaves the previously saved index (if any) in place.
//!
//! # Example
//!
//! ```rust,ignore
//! use medbot_rag::{IngestPipeline, DirectoryLoader, RecursiveChunker, RagConfig};
//!
//! let report = IngestPipeline::builder()
//!     .config(RagConfig::default())
//!     .source(Arc::new(DirectoryLoader::new("data/", DEFAULT_GLOB)?))
//!     .embedding_provider(embedder)
//!     .index_path("vectorstore/db_index")
//!     .build()?
//!     .run()
//!     .await?;
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};

use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::RagConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::loader::DocumentSource;

/// Summary of a completed ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// Number of documents loaded.
    pub document_count: usize,
    /// Number of chunks indexed.
    pub chunk_count: usize,
    /// Dimensionality of the stored vectors.
    pub dimensions: usize,
    /// Where the index was saved.
    pub index_path: PathBuf,
}

/// The ingestion orchestrator. Construct one via [`IngestPipeline::builder()`].
pub struct IngestPipeline {
    config: RagConfig,
    source: Arc<dyn DocumentSource>,
    chunker: Arc<dyn Chunker>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    index_path: PathBuf,
}

impl IngestPipeline {
    /// Create a new [`IngestPipelineBuilder`].
    pub fn builder() -> IngestPipelineBuilder {
        IngestPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Build the index in memory without saving it.
    ///
    /// # Errors
    ///
    /// Returns loader and embedding failures, and [`RagError::EmptyCorpus`]
    /// when the corpus produces no chunks.
    pub async fn build_index(&self) -> Result<(usize, VectorIndex)> {
        let documents = self.source.load().await.inspect_err(|e| {
            error!(error = %e, "failed to load corpus");
        })?;

        let chunks = self.chunker.split_documents(&documents);
        info!(document_count = documents.len(), chunk_count = chunks.len(), "chunked corpus");

        let index = VectorIndex::build_batched(
            chunks,
            self.embedding_provider.as_ref(),
            self.config.embed_batch_size,
        )
        .await
        .inspect_err(|e| {
            error!(error = %e, "failed to build index");
        })?;
        Ok((documents.len(), index))
    }

    /// Run the full pipeline and persist the index.
    ///
    /// # Errors
    ///
    /// Everything [`build_index`](Self::build_index) returns, plus
    /// [`RagError::PipelineError`] if saving fails. Nothing is persisted unless
    /// every stage succeeds.
    pub async fn run(&self) -> Result<IngestReport> {
        let (document_count, index) = self.build_index().await?;
        index.save(&self.index_path).map_err(|e| {
            error!(path = %self.index_path.display(), error = %e, "failed to save index");
            RagError::PipelineError(format!(
                "failed to save index to '{}': {e}",
                self.index_path.display()
            ))
        })?;

        let report = IngestReport {
            document_count,
            chunk_count: index.len(),
            dimensions: index.dimensions(),
            index_path: self.index_path.clone(),
        };
        info!(
            document_count = report.document_count,
            chunk_count = report.chunk_count,
            path = %report.index_path.display(),
            "ingestion completed"
        );
        Ok(report)
    }
}

/// Builder for constructing an [`IngestPipeline`].
///
/// `source`, `embedding_provider` and `index_path` are required. Without an
/// explicit chunker, a [`RecursiveChunker`] is built from the configuration.
#[derive(Default)]
pub struct IngestPipelineBuilder {
    config: Option<RagConfig>,
    source: Option<Arc<dyn DocumentSource>>,
    chunker: Option<Arc<dyn Chunker>>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    index_path: Option<PathBuf>,
}

impl IngestPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the document source.
    pub fn source(mut self, source: Arc<dyn DocumentSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the directory the index is saved to.
    pub fn index_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.index_path = Some(path.into());
        self
    }

    /// Build the [`IngestPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any required field is missing or
    /// the configuration is invalid.
    pub fn build(self) -> Result<IngestPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let source =
            self.source.ok_or_else(|| RagError::ConfigError("source is required".to_string()))?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let index_path = self
            .index_path
            .ok_or_else(|| RagError::ConfigError("index_path is required".to_string()))?;
        let chunker =
            self.chunker.unwrap_or_else(|| Arc::new(RecursiveChunker::from_config(&config)));

        Ok(IngestPipeline { config, source, chunker, embedding_provider, index_path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::embedding::HashingEmbeddingProvider;
    use crate::loader::StaticSource;

    fn pipeline(documents: Vec<Document>, path: PathBuf) -> IngestPipeline {
        IngestPipeline::builder()
            .config(RagConfig::builder().chunk_size(30).chunk_overlap(5).build().unwrap())
            .source(Arc::new(StaticSource::new(documents)))
            .embedding_provider(Arc::new(HashingEmbeddingProvider::new(16).unwrap()))
            .index_path(path)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn run_persists_a_loadable_index() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("db_index");
        let doc = Document::new("d", "Aspirin reduces fever. Ibuprofen reduces inflammation.");

        let report = pipeline(vec![doc], path.clone()).run().await.unwrap();
        assert_eq!(report.document_count, 1);
        assert_eq!(report.chunk_count, 3);
        assert_eq!(report.dimensions, 16);

        let loaded = VectorIndex::load(&path, 16).unwrap();
        assert_eq!(loaded.len(), 3);
    }

    #[tokio::test]
    async fn empty_corpus_aborts_without_writing() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("db_index");

        let err = pipeline(vec![Document::new("empty", "")], path.clone()).run().await.unwrap_err();
        assert!(matches!(err, RagError::EmptyCorpus));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn unwritable_destination_is_a_pipeline_error() {
        let temp = tempfile::tempdir().unwrap();
        let blocker = temp.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();

        let err = pipeline(vec![Document::new("d", "Some text.")], blocker.join("db_index"))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::PipelineError(msg) if msg.contains("db_index")));
    }

    #[test]
    fn missing_source_is_rejected() {
        let result = IngestPipeline::builder()
            .embedding_provider(Arc::new(HashingEmbeddingProvider::new(4).unwrap()))
            .index_path("x")
            .build();
        assert!(matches!(result, Err(RagError::ConfigError(msg)) if msg.contains("source")));
    }
}
