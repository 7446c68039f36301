//! Configuration for chunking, retrieval, answer extraction, and the model gateways.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Configuration parameters for the RAG pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Maximum number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of top results to return from vector search.
    pub top_k: usize,
    /// Number of chunk texts sent to the embedding provider per request.
    pub embed_batch_size: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self { chunk_size: 500, chunk_overlap: 50, top_k: 2, embed_batch_size: 64 }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0`
    /// - `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `embed_batch_size == 0`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if self.embed_batch_size == 0 {
            return Err(RagError::ConfigError(
                "embed_batch_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of top results to return from vector search.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set how many chunk texts are embedded per provider call.
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Controls how the final answer is carved out of the generated token stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnswerConfig {
    /// Token sequence that marks the start of the answer body.
    pub prefix_tokens: Vec<String>,
    /// Treat the prefix as already seen: stream every token immediately.
    pub stream_from_start: bool,
    /// Compare tokens against the prefix with surrounding whitespace trimmed.
    pub strip_tokens: bool,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            prefix_tokens: vec!["FINAL".to_string(), "ANSWER".to_string()],
            stream_from_start: false,
            strip_tokens: true,
        }
    }
}

impl AnswerConfig {
    /// A configuration that streams every token immediately, with no prefix detection.
    pub fn stream_from_start() -> Self {
        Self { stream_from_start: true, ..Self::default() }
    }
}

/// Which embedding backend the gateway factory constructs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// Offline feature-hashing embedder.
    #[default]
    Hashing,
    /// OpenAI-compatible `/embeddings` endpoint.
    #[serde(rename = "openai")]
    OpenAI,
}

/// Configuration for the embedding gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Backend to construct.
    pub provider: EmbeddingBackend,
    /// Model name sent to HTTP backends. The hashing backend ignores it and
    /// records its own identifier in the index descriptor.
    pub model: String,
    /// Device the model should run on. No shipped backend runs a model
    /// in-process, so this is only logged.
    pub device: String,
    /// Output dimensionality.
    pub dimensions: usize,
    /// Base URL for HTTP backends (e.g. `http://localhost:11434/v1` for Ollama).
    pub base_url: Option<String>,
    /// Environment variable holding the API key for HTTP backends.
    pub api_key_env: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::Hashing,
            model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            device: "cpu".to_string(),
            dimensions: 384,
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

/// Which generation backend the gateway factory constructs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GenerationBackend {
    /// OpenAI-compatible streaming `/chat/completions` endpoint.
    #[default]
    #[serde(rename = "openai")]
    OpenAI,
    /// Replays the configured `script` tokens; useful for demos and smoke tests.
    Scripted,
}

/// Configuration for the generation gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Backend to construct.
    pub provider: GenerationBackend,
    /// Model identifier.
    pub model: String,
    /// Maximum number of tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Base URL for HTTP backends.
    pub base_url: Option<String>,
    /// Environment variable holding the API key for HTTP backends.
    pub api_key_env: String,
    /// Tokens replayed by the scripted backend.
    pub script: Vec<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: GenerationBackend::OpenAI,
            model: "llama2:7b-chat".to_string(),
            max_tokens: 512,
            temperature: 0.5,
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            script: Vec::new(),
        }
    }
}

impl GenerationConfig {
    /// Check that the sampling parameters are in range.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for a zero `max_tokens` or a
    /// temperature outside `0.0..=2.0`.
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(RagError::ConfigError("max_tokens must be greater than zero".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(RagError::ConfigError(format!(
                "temperature ({}) must be within 0.0..=2.0",
                self.temperature
            )));
        }
        Ok(())
    }
}
