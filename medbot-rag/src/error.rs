//! Error types for the `medbot-rag` crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in RAG operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// An index build was attempted with zero chunks.
    #[error("cannot build an index from an empty corpus")]
    EmptyCorpus,

    /// A persisted index failed structural or version validation.
    #[error("index at {} is corrupt: {message}", path.display())]
    IndexCorrupt {
        /// Location of the persisted index.
        path: PathBuf,
        /// A description of the failure.
        message: String,
    },

    /// Embedding dimensionality disagreement between build, load, or query.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The dimensionality the index (or caller) expects.
        expected: usize,
        /// The dimensionality that was supplied.
        actual: usize,
    },

    /// The index was built by a different embedding model than the one in use.
    #[error("index was built with embedding model '{found}', but '{expected}' is configured")]
    EmbeddingModelMismatch {
        /// The model identifier of the configured provider.
        expected: String,
        /// The model identifier recorded in the index descriptor.
        found: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The generative capability failed or was unreachable.
    #[error("Generation error ({provider}): {message}")]
    GenerationError {
        /// The generation provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An in-flight answer was superseded or its session ended.
    #[error("answer cancelled")]
    Cancelled,

    /// A document could not be loaded from the corpus.
    #[error("failed to load document {}: {message}", path.display())]
    LoaderError {
        /// The offending file.
        path: PathBuf,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An error in the ingestion pipeline orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// An I/O error while persisting or reading data.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A serialization error while persisting data.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// Whether this error is the expected outcome of a superseded or torn-down call.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RagError::Cancelled)
    }

    /// The message to show an end user for this failure.
    ///
    /// Returns `None` for [`RagError::Cancelled`]: a superseded turn produces
    /// no message at all.
    pub fn user_message(&self) -> Option<String> {
        match self {
            RagError::Cancelled => None,
            RagError::GenerationError { .. } => Some(
                "Sorry, I couldn't generate an answer right now. Please try again in a moment."
                    .to_string(),
            ),
            other => Some(format!("Sorry, something went wrong while answering: {other}")),
        }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
