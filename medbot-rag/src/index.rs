//! Persistent vector index using cosine similarity.
//!
//! A [`VectorIndex`] owns an ordered list of chunks and their embedding
//! vectors together with an [`IndexDescriptor`] recording how it was built.
//! It is immutable once built, so an `Arc<VectorIndex>` can be shared by any
//! number of concurrent readers.
//!
//! On disk an index is a directory holding a single `index.json` file with the
//! descriptor, the chunk records and their vectors. [`VectorIndex::save`]
//! writes a temporary file next to it and renames it into place, so readers
//! only ever observe a complete index.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::document::{Chunk, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// Version of the on-disk layout written by this crate.
pub const FORMAT_VERSION: u32 = 1;

/// File name of the index payload inside the index directory.
pub const INDEX_FILE_NAME: &str = "index.json";

const DEFAULT_EMBED_BATCH_SIZE: usize = 64;

/// Similarity metric used to rank stored vectors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Cosine similarity; higher is more similar.
    Cosine,
}

/// Describes how an index was built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexDescriptor {
    /// Layout version; loading rejects anything but [`FORMAT_VERSION`].
    pub format_version: u32,
    /// Dimensionality of every stored vector.
    pub dimensions: usize,
    /// Metric used by [`VectorIndex::search`].
    pub metric: SimilarityMetric,
    /// Identifier of the embedding model that produced the vectors.
    pub embedding_model: String,
    /// Number of stored chunks.
    pub chunk_count: usize,
    /// When the index was built.
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct IndexRecord {
    chunk: Chunk,
    vector: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    descriptor: IndexDescriptor,
    records: Vec<IndexRecord>,
}

/// Only the version field, read before attempting a full parse.
#[derive(Deserialize)]
struct VersionProbe {
    descriptor: VersionOnly,
}

#[derive(Deserialize)]
struct VersionOnly {
    format_version: u32,
}

/// An immutable collection of chunks and their embeddings.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    descriptor: IndexDescriptor,
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

impl VectorIndex {
    /// Embed every chunk with `provider` and build an index over the results.
    ///
    /// Chunks are embedded in batches of 64; see
    /// [`build_batched`](Self::build_batched) to choose the batch size.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyCorpus`] if `chunks` is empty
    /// - [`RagError::EmbeddingError`] if the provider fails or returns the wrong number of vectors
    /// - [`RagError::DimensionMismatch`] if a vector's length differs from `provider.dimensions()`
    pub async fn build(chunks: Vec<Chunk>, provider: &dyn EmbeddingProvider) -> Result<Self> {
        Self::build_batched(chunks, provider, DEFAULT_EMBED_BATCH_SIZE).await
    }

    /// Like [`build`](Self::build), embedding `batch_size` chunks per provider call.
    pub async fn build_batched(
        chunks: Vec<Chunk>,
        provider: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Result<Self> {
        if chunks.is_empty() {
            return Err(RagError::EmptyCorpus);
        }

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size.max(1)) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let embeddings = provider.embed_batch(&texts).await?;
            if embeddings.len() != batch.len() {
                return Err(RagError::EmbeddingError {
                    provider: provider.model_id().to_string(),
                    message: format!(
                        "expected {} embeddings, received {}",
                        batch.len(),
                        embeddings.len()
                    ),
                });
            }
            vectors.extend(embeddings);
            debug!(embedded = vectors.len(), total = chunks.len(), "embedded chunk batch");
        }

        Self::from_embeddings(chunks, vectors, provider.model_id(), provider.dimensions())
    }

    /// Build an index from precomputed vectors.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyCorpus`] if `chunks` is empty
    /// - [`RagError::ConfigError`] if `chunks` and `vectors` differ in length
    /// - [`RagError::DimensionMismatch`] if any vector's length differs from `dimensions`
    pub fn from_embeddings(
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
        embedding_model: &str,
        dimensions: usize,
    ) -> Result<Self> {
        if chunks.is_empty() {
            return Err(RagError::EmptyCorpus);
        }
        if chunks.len() != vectors.len() {
            return Err(RagError::ConfigError(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
            return Err(RagError::DimensionMismatch { expected: dimensions, actual: bad.len() });
        }

        let descriptor = IndexDescriptor {
            format_version: FORMAT_VERSION,
            dimensions,
            metric: SimilarityMetric::Cosine,
            embedding_model: embedding_model.to_string(),
            chunk_count: chunks.len(),
            created_at: Utc::now(),
        };
        info!(chunk_count = chunks.len(), dimensions, "built vector index");
        Ok(Self { descriptor, chunks, vectors })
    }

    /// The build descriptor.
    pub fn descriptor(&self) -> &IndexDescriptor {
        &self.descriptor
    }

    /// Dimensionality of the stored vectors.
    pub fn dimensions(&self) -> usize {
        self.descriptor.dimensions
    }

    /// Stored chunks, in insertion order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Number of stored chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Return the `top_k` chunks most similar to `query`.
    ///
    /// Results are ordered by descending cosine similarity; equal scores keep
    /// insertion order. Exactly `min(top_k, self.len())` results are returned.
    ///
    /// # Errors
    ///
    /// - [`RagError::DimensionMismatch`] if `query` has the wrong length
    /// - [`RagError::ConfigError`] if `top_k` is zero
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if query.len() != self.descriptor.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: self.descriptor.dimensions,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, vector)| (i, cosine_similarity(vector, query)))
            .collect();

        // sort_by is stable, so ties keep insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| SearchResult { chunk: self.chunks[i].clone(), score })
            .collect())
    }

    /// Persist the index into the directory at `path`, creating it if needed.
    ///
    /// The payload is written to a temporary file inside the directory, synced,
    /// and renamed over `index.json`. A failure at any point leaves any
    /// previously saved index untouched.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let dir = path.as_ref();
        fs::create_dir_all(dir)?;

        let records = self
            .chunks
            .iter()
            .zip(&self.vectors)
            .map(|(chunk, vector)| IndexRecord { chunk: chunk.clone(), vector: vector.clone() })
            .collect();
        let persisted = PersistedIndex { descriptor: self.descriptor.clone(), records };

        let mut temp = tempfile::Builder::new().prefix(".index-").suffix(".tmp").tempfile_in(dir)?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            serde_json::to_writer(&mut writer, &persisted)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;

        let target = dir.join(INDEX_FILE_NAME);
        temp.persist(&target).map_err(|e| RagError::Io(e.error))?;
        info!(path = %target.display(), chunk_count = self.len(), "saved vector index");
        Ok(())
    }

    /// Load an index saved with [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// - [`RagError::IndexCorrupt`] if the payload is missing, unreadable,
    ///   structurally inconsistent, or has an unknown format version
    /// - [`RagError::DimensionMismatch`] if the stored dimensionality differs
    ///   from `expected_dimensions`
    pub fn load(path: impl AsRef<Path>, expected_dimensions: usize) -> Result<Self> {
        let file_path = path.as_ref().join(INDEX_FILE_NAME);
        let corrupt = |message: String| RagError::IndexCorrupt { path: file_path.clone(), message };

        let bytes = fs::read(&file_path).map_err(|e| corrupt(format!("cannot read: {e}")))?;

        check_format_version(&bytes, &corrupt)?;

        let persisted: PersistedIndex =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(format!("malformed payload: {e}")))?;
        let descriptor = persisted.descriptor;

        if descriptor.dimensions != expected_dimensions {
            return Err(RagError::DimensionMismatch {
                expected: expected_dimensions,
                actual: descriptor.dimensions,
            });
        }
        if descriptor.chunk_count != persisted.records.len() {
            return Err(corrupt(format!(
                "descriptor lists {} chunks but {} records are stored",
                descriptor.chunk_count,
                persisted.records.len()
            )));
        }

        let mut chunks = Vec::with_capacity(persisted.records.len());
        let mut vectors = Vec::with_capacity(persisted.records.len());
        for record in persisted.records {
            if record.vector.len() != descriptor.dimensions {
                return Err(corrupt(format!(
                    "chunk '{}' has a {}-dimensional vector, descriptor says {}",
                    record.chunk.id,
                    record.vector.len(),
                    descriptor.dimensions
                )));
            }
            chunks.push(record.chunk);
            vectors.push(record.vector);
        }

        info!(path = %file_path.display(), chunk_count = chunks.len(), "loaded vector index");
        Ok(Self { descriptor, chunks, vectors })
    }

    /// Load an index and check it was built by `provider`'s model.
    ///
    /// # Errors
    ///
    /// Everything [`load`](Self::load) returns, plus
    /// [`RagError::EmbeddingModelMismatch`] if the recorded model differs.
    pub fn load_for(path: impl AsRef<Path>, provider: &dyn EmbeddingProvider) -> Result<Self> {
        let index = Self::load(path, provider.dimensions())?;
        if index.descriptor.embedding_model != provider.model_id() {
            return Err(RagError::EmbeddingModelMismatch {
                expected: provider.model_id().to_string(),
                found: index.descriptor.embedding_model.clone(),
            });
        }
        Ok(index)
    }

    /// Location of the payload file for an index stored at `path`.
    pub fn payload_path(path: impl AsRef<Path>) -> PathBuf {
        path.as_ref().join(INDEX_FILE_NAME)
    }
}

/// Read the descriptor of a saved index without loading its records.
///
/// # Errors
///
/// Returns [`RagError::IndexCorrupt`] if the payload is unreadable or has an
/// unknown format version.
pub fn read_descriptor(path: impl AsRef<Path>) -> Result<IndexDescriptor> {
    let file_path = VectorIndex::payload_path(path);
    let corrupt = |message: String| RagError::IndexCorrupt { path: file_path.clone(), message };

    let bytes = fs::read(&file_path).map_err(|e| corrupt(format!("cannot read: {e}")))?;
    check_format_version(&bytes, &corrupt)?;
    let probe: DescriptorProbe = serde_json::from_slice(&bytes)
        .map_err(|e| corrupt(format!("unreadable descriptor: {e}")))?;
    Ok(probe.descriptor)
}

fn check_format_version(bytes: &[u8], corrupt: &impl Fn(String) -> RagError) -> Result<()> {
    let probe: VersionProbe = serde_json::from_slice(bytes)
        .map_err(|e| corrupt(format!("unreadable descriptor: {e}")))?;
    if probe.descriptor.format_version != FORMAT_VERSION {
        return Err(corrupt(format!(
            "unsupported format version {} (expected {FORMAT_VERSION})",
            probe.descriptor.format_version
        )));
    }
    Ok(())
}

#[derive(Deserialize)]
struct DescriptorProbe {
    descriptor: IndexDescriptor,
}
