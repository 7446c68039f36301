//! Retrieval-augmented answering.
//!
//! The [`AnswerEngine`] answers one question at a time: embed the question →
//! search the [`VectorIndex`] → assemble the prompt → stream generation through
//! the [`AnswerExtractor`] → attach the retrieved chunks as sources.
//!
//! # Example
//!
//! ```rust,ignore
//! use medbot_rag::{AnswerEngine, AnswerEvent};
//!
//! let engine = AnswerEngine::builder()
//!     .index(Arc::new(index))
//!     .embedding_provider(embedder)
//!     .generation_provider(generator)
//!     .build()?;
//!
//! let mut events = engine.stream_answer("What reduces fever?", CancellationToken::new()).await?;
//! while let Some(event) = events.next().await {
//!     match event? {
//!         AnswerEvent::Delta(text) => print!("{text}"),
//!         AnswerEvent::Completed(answer) => println!("\n{} sources", answer.sources.len()),
//!     }
//! }
//! ```

use std::pin::Pin;
use std::sync::Arc;

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{AnswerConfig, RagConfig};
use crate::document::{Answer, Chunk, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::extract::AnswerExtractor;
use crate::generation::GenerationProvider;
use crate::index::VectorIndex;
use crate::prompt::PromptTemplate;

/// An event produced while streaming an answer.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerEvent {
    /// A piece of answer text, in order.
    Delta(String),
    /// The final answer with its sources. Always the last event of a stream.
    Completed(Answer),
}

/// Stream of [`AnswerEvent`]s for one question.
pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<AnswerEvent>> + Send>>;

enum Step {
    Token(Result<String>),
    Exhausted,
    Cancelled,
}

/// Answers questions against a read-only [`VectorIndex`].
///
/// Construct one via [`AnswerEngine::builder()`]. The engine holds no per-call
/// state, so one instance can serve calls from several tasks.
pub struct AnswerEngine {
    config: RagConfig,
    answer_config: AnswerConfig,
    prompt: PromptTemplate,
    index: Arc<VectorIndex>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    generation_provider: Arc<dyn GenerationProvider>,
}

impl AnswerEngine {
    /// Create a new [`AnswerEngineBuilder`].
    pub fn builder() -> AnswerEngineBuilder {
        AnswerEngineBuilder::default()
    }

    /// Return a reference to the retrieval configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the index being searched.
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Embed the question and return the `top_k` most similar chunks.
    ///
    /// # Errors
    ///
    /// Propagates embedding failures and [`RagError::DimensionMismatch`].
    pub async fn retrieve(&self, question: &str) -> Result<Vec<SearchResult>> {
        let query = self.embedding_provider.embed(question).await.inspect_err(|e| {
            error!(error = %e, "embedding failed during query");
        })?;
        let results = self.index.search(&query, self.config.top_k).inspect_err(|e| {
            error!(error = %e, "vector search failed");
        })?;
        debug!(top_k = self.config.top_k, result_count = results.len(), "retrieved context");
        Ok(results)
    }

    /// Answer `question` as a stream of [`AnswerEvent`]s.
    ///
    /// Retrieval and prompt assembly happen before this returns; generation
    /// runs as the stream is polled. When `cancel` fires, the generation stream
    /// is dropped and the answer stream ends with [`RagError::Cancelled`]
    /// without a [`AnswerEvent::Completed`] event.
    ///
    /// # Errors
    ///
    /// Returns retrieval failures, [`RagError::Cancelled`], or the
    /// [`RagError::GenerationError`] raised when starting generation.
    pub async fn stream_answer(
        &self,
        question: &str,
        cancel: CancellationToken,
    ) -> Result<AnswerStream> {
        let retrieved = self.retrieve(question).await?;
        let prompt = self.prompt.assemble(&retrieved, question);
        let sources: Vec<Chunk> = retrieved.into_iter().map(|r| r.chunk).collect();

        let provider = self.generation_provider.name().to_string();
        let mut tokens = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RagError::Cancelled),
            started = self.generation_provider.generate(&prompt) => {
                started.map_err(|e| as_generation_error(&provider, e))?
            }
        };
        debug!(provider = %provider, prompt_len = prompt.len(), "generation started");

        let mut extractor = AnswerExtractor::new(&self.answer_config);
        let stream = try_stream! {
            loop {
                let step = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Step::Cancelled,
                    next = tokens.next() => match next {
                        Some(token) => Step::Token(token),
                        None => Step::Exhausted,
                    },
                };

                match step {
                    Step::Token(token) => {
                        let token = token.map_err(|e| as_generation_error(&provider, e))?;
                        if let Some(delta) = extractor.push(&token) {
                            yield AnswerEvent::Delta(delta);
                        }
                    }
                    Step::Exhausted => break,
                    Step::Cancelled => {
                        debug!("answer cancelled, discarding partial output");
                        Err::<(), _>(RagError::Cancelled)?;
                    }
                }
            }

            if let Some(rest) = extractor.finish() {
                yield AnswerEvent::Delta(rest);
            }
            let answer = Answer { text: extractor.into_answer(), sources };
            info!(
                answer_len = answer.text.len(),
                source_count = answer.sources.len(),
                "answer completed"
            );
            yield AnswerEvent::Completed(answer);
        };

        Ok(Box::pin(stream))
    }

    /// Answer `question` and wait for the complete result.
    ///
    /// # Errors
    ///
    /// Same as [`stream_answer`](Self::stream_answer), plus any failure raised
    /// while the generation stream is consumed.
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        collect_answer(self.stream_answer(question, CancellationToken::new()).await?).await
    }
}

/// Drain an [`AnswerStream`], returning its final answer.
///
/// # Errors
///
/// Returns the first error in the stream, or [`RagError::Cancelled`] if the
/// stream ends without a [`AnswerEvent::Completed`] event.
pub async fn collect_answer(mut stream: AnswerStream) -> Result<Answer> {
    while let Some(event) = stream.next().await {
        if let AnswerEvent::Completed(answer) = event? {
            return Ok(answer);
        }
    }
    Err(RagError::Cancelled)
}

fn as_generation_error(provider: &str, error: RagError) -> RagError {
    match error {
        RagError::GenerationError { .. } | RagError::Cancelled => error,
        other => {
            error!(provider, error = %other, "generation failed");
            RagError::GenerationError { provider: provider.to_string(), message: other.to_string() }
        }
    }
}

/// Builder for constructing an [`AnswerEngine`].
///
/// `index`, `embedding_provider` and `generation_provider` are required; the
/// configuration and prompt template fall back to their defaults.
#[derive(Default)]
pub struct AnswerEngineBuilder {
    config: Option<RagConfig>,
    answer_config: Option<AnswerConfig>,
    prompt: Option<PromptTemplate>,
    index: Option<Arc<VectorIndex>>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    generation_provider: Option<Arc<dyn GenerationProvider>>,
}

impl AnswerEngineBuilder {
    /// Set the retrieval configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the answer-extraction configuration.
    pub fn answer_config(mut self, config: AnswerConfig) -> Self {
        self.answer_config = Some(config);
        self
    }

    /// Set the prompt template.
    pub fn prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Set the index to search.
    pub fn index(mut self, index: Arc<VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Set the embedding provider used for questions.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the generation provider.
    pub fn generation_provider(mut self, provider: Arc<dyn GenerationProvider>) -> Self {
        self.generation_provider = Some(provider);
        self
    }

    /// Build the [`AnswerEngine`].
    ///
    /// # Errors
    ///
    /// - [`RagError::ConfigError`] if a required field is missing or the configuration is invalid
    /// - [`RagError::DimensionMismatch`] if the embedding provider's dimensionality
    ///   differs from the index's
    pub fn build(self) -> Result<AnswerEngine> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let index =
            self.index.ok_or_else(|| RagError::ConfigError("index is required".to_string()))?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let generation_provider = self
            .generation_provider
            .ok_or_else(|| RagError::ConfigError("generation_provider is required".to_string()))?;

        if embedding_provider.dimensions() != index.dimensions() {
            return Err(RagError::DimensionMismatch {
                expected: index.dimensions(),
                actual: embedding_provider.dimensions(),
            });
        }

        Ok(AnswerEngine {
            config,
            answer_config: self.answer_config.unwrap_or_default(),
            prompt: self.prompt.unwrap_or_default(),
            index,
            embedding_provider,
            generation_provider,
        })
    }
}
