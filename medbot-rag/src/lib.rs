//! # medbot-rag
//!
//! Retrieval-augmented question answering over a local document corpus.
//!
//! ## Overview
//!
//! The crate is split into two halves that share a persisted index:
//!
//! - **Ingestion**: [`DocumentSource`] → [`RecursiveChunker`] →
//!   [`EmbeddingProvider`] → [`VectorIndex::save`], driven by [`IngestPipeline`]
//! - **Answering**: [`VectorIndex::load_for`] → [`AnswerEngine`], which embeds
//!   the question, retrieves the top-k chunks, assembles a [`PromptTemplate`],
//!   and streams generation through an [`AnswerExtractor`] that strips the
//!   `FINAL ANSWER` sentinel
//!
//! [`SessionManager`] keeps one [`Session`] per conversation; asking a new
//! question in a session cancels the previous one.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use medbot_rag::{AnswerEngine, MockGenerationProvider, VectorIndex, embedding_from_config};
//!
//! let embedder = embedding_from_config(&Default::default())?;
//! let index = VectorIndex::load_for("vectorstore/db_index", embedder.as_ref())?;
//! let engine = AnswerEngine::builder()
//!     .index(Arc::new(index))
//!     .embedding_provider(embedder)
//!     .generation_provider(Arc::new(MockGenerationProvider::new(["FINAL", "ANSWER", "Rest."])))
//!     .build()?;
//!
//! println!("{}", engine.answer("What reduces fever?").await?);
//! ```
//!
//! ## Features
//!
//! - `openai`: HTTP providers for OpenAI-compatible APIs (OpenAI, Ollama, vLLM)

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod generation;
pub mod index;
pub mod loader;
#[cfg(feature = "openai")]
pub mod openai;
pub mod pipeline;
pub mod prompt;
pub mod session;

pub use chunking::{Chunker, DEFAULT_SEPARATORS, RecursiveChunker};
pub use config::{
    AnswerConfig, EmbeddingBackend, EmbeddingConfig, GenerationBackend, GenerationConfig,
    RagConfig, RagConfigBuilder,
};
pub use document::{Answer, Chunk, Document, SearchResult};
pub use embedding::{EmbeddingProvider, HashingEmbeddingProvider};
pub use engine::{AnswerEngine, AnswerEngineBuilder, AnswerEvent, AnswerStream, collect_answer};
pub use error::{RagError, Result};
pub use extract::{AnswerExtractor, ExtractionState};
pub use gateway::{embedding_from_config, generation_from_config};
pub use generation::{GenerationProvider, MockGenerationProvider, TokenStream};
pub use index::{IndexDescriptor, SimilarityMetric, VectorIndex, read_descriptor};
pub use loader::{DEFAULT_GLOB, DirectoryLoader, DocumentSource, StaticSource};
pub use pipeline::{IngestPipeline, IngestPipelineBuilder, IngestReport};
pub use prompt::PromptTemplate;
pub use session::{Session, SessionId, SessionManager};
