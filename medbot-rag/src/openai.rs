//! Providers for OpenAI-compatible HTTP APIs.
//!
//! Works against api.openai.com as well as local servers that speak the same
//! protocol (Ollama, vLLM, llama.cpp server) via a configurable base URL.
//!
//! This module is only available when the `openai` feature is enabled.

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::{EmbeddingConfig, GenerationConfig};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::{GenerationProvider, TokenStream};

/// The default API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

const PROVIDER: &str = "OpenAI";

fn api_key(env_var: &str) -> Option<String> {
    std::env::var(env_var).ok().filter(|key| !key.is_empty())
}

fn endpoint(base_url: Option<&str>, path: &str) -> String {
    format!("{}/{path}", base_url.unwrap_or(OPENAI_BASE_URL).trim_end_matches('/'))
}

async fn api_error(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail =
        serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
    format!("API returned {status}: {detail}")
}

/// An [`EmbeddingProvider`] backed by an OpenAI-compatible `/embeddings` endpoint.
///
/// # Example
///
/// ```rust,ignore
/// use medbot_rag::{EmbeddingConfig, openai::OpenAIEmbeddingProvider};
///
/// let provider = OpenAIEmbeddingProvider::from_config(&EmbeddingConfig {
///     base_url: Some("http://localhost:11434/v1".into()),
///     model: "all-minilm".into(),
///     ..EmbeddingConfig::default()
/// })?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
}

impl OpenAIEmbeddingProvider {
    /// Create a provider from configuration.
    ///
    /// The API key is read from the environment variable named by
    /// `api_key_env`; a missing key is only an error when talking to the
    /// default endpoint, since local servers usually run without one.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for zero dimensions or a missing key.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        if config.dimensions == 0 {
            return Err(RagError::ConfigError(
                "embedding dimensions must be greater than zero".to_string(),
            ));
        }
        let api_key = api_key(&config.api_key_env);
        if api_key.is_none() && config.base_url.is_none() {
            return Err(RagError::ConfigError(format!(
                "{} environment variable not set",
                config.api_key_env
            )));
        }
        debug!(model = %config.model, device = %config.device, "configured embedding endpoint");

        Ok(Self {
            client: reqwest::Client::new(),
            url: endpoint(config.base_url.as_deref(), "embeddings"),
            api_key,
            model: config.model.clone(),
            dimensions: config.dimensions,
        })
    }

    fn embedding_error(message: String) -> RagError {
        RagError::EmbeddingError { provider: PROVIDER.into(), message }
    }
}

// ── API request/response types ──

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

// ── EmbeddingProvider implementation ──

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| Self::embedding_error("API returned empty response".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(
            provider = PROVIDER,
            batch_size = texts.len(),
            model = %self.model,
            "embedding batch"
        );

        let mut request = self
            .client
            .post(&self.url)
            .json(&EmbeddingRequest { model: &self.model, input: texts.to_vec() });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "request failed");
            Self::embedding_error(format!("request failed: {e}"))
        })?;
        if !response.status().is_success() {
            let message = api_error(response).await;
            error!(provider = PROVIDER, %message, "API error");
            return Err(Self::embedding_error(message));
        }

        let mut parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            Self::embedding_error(format!("failed to parse response: {e}"))
        })?;
        if parsed.data.len() != texts.len() {
            return Err(Self::embedding_error(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|d| d.index);

        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimensions) {
            return Err(RagError::DimensionMismatch {
                expected: self.dimensions,
                actual: bad.len(),
            });
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// A [`GenerationProvider`] streaming from an OpenAI-compatible
/// `/chat/completions` endpoint.
///
/// The prompt is sent as a single user message with `stream: true`; each
/// server-sent `data:` event contributes its `delta.content` as one token.
pub struct OpenAIGenerationProvider {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAIGenerationProvider {
    /// Create a provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for invalid sampling parameters, or a
    /// missing API key when no `base_url` is configured.
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        config.validate()?;
        let api_key = api_key(&config.api_key_env);
        if api_key.is_none() && config.base_url.is_none() {
            return Err(RagError::ConfigError(format!(
                "{} environment variable not set",
                config.api_key_env
            )));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            url: endpoint(config.base_url.as_deref(), "chat/completions"),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn generation_error(message: String) -> RagError {
        RagError::GenerationError { provider: PROVIDER.into(), message }
    }
}

/// Outcome of one server-sent event line.
#[derive(Debug, PartialEq)]
enum SseLine {
    Token(String),
    Skip,
    Done,
}

fn parse_sse_line(line: &str) -> Result<SseLine> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseLine::Skip);
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }
    let chunk: ChatChunk = serde_json::from_str(data).map_err(|e| {
        OpenAIGenerationProvider::generation_error(format!("malformed stream event: {e}"))
    })?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|content| !content.is_empty())
        .map_or(SseLine::Skip, SseLine::Token))
}

#[async_trait]
impl GenerationProvider for OpenAIGenerationProvider {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<TokenStream> {
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage { role: "user", content: prompt }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: true,
        };
        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "request failed");
            Self::generation_error(format!("request failed: {e}"))
        })?;
        if !response.status().is_success() {
            let message = api_error(response).await;
            error!(provider = PROVIDER, %message, "API error");
            return Err(Self::generation_error(message));
        }

        let mut bytes = response.bytes_stream();
        let stream = try_stream! {
            // Raw bytes so multi-byte characters split across chunks survive.
            let mut buffer: Vec<u8> = Vec::new();
            'events: while let Some(chunk) = bytes.next().await {
                let chunk = chunk
                    .map_err(|e| Self::generation_error(format!("stream interrupted: {e}")))?;
                buffer.extend_from_slice(&chunk);

                while let Some(end) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=end).collect();
                    match parse_sse_line(&String::from_utf8_lossy(&line))? {
                        SseLine::Token(token) => yield token,
                        SseLine::Skip => {}
                        SseLine::Done => break 'events,
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_url() {
        assert_eq!(endpoint(None, "embeddings"), "https://api.openai.com/v1/embeddings");
        assert_eq!(
            endpoint(Some("http://localhost:11434/v1/"), "chat/completions"),
            "http://localhost:11434/v1/chat/completions"
        );
    }

    #[test]
    fn parses_content_deltas() {
        let line = r#"data: {"choices":[{"delta":{"content":"Aspirin"}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap(), SseLine::Token("Aspirin".into()));
    }

    #[test]
    fn role_only_and_blank_lines_are_skipped() {
        let role = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_sse_line(role).unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line("").unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), SseLine::Skip);
    }

    #[test]
    fn done_marker_ends_the_stream() {
        assert_eq!(parse_sse_line("data: [DONE]\n").unwrap(), SseLine::Done);
    }

    #[test]
    fn malformed_event_is_a_generation_error() {
        assert!(matches!(
            parse_sse_line("data: {not json"),
            Err(RagError::GenerationError { .. })
        ));
    }

    #[test]
    fn local_server_needs_no_api_key() {
        let config = GenerationConfig {
            base_url: Some("http://localhost:11434/v1".into()),
            api_key_env: "MEDBOT_TEST_UNSET_KEY".into(),
            ..GenerationConfig::default()
        };
        assert!(OpenAIGenerationProvider::from_config(&config).is_ok());
    }

    #[test]
    fn hosted_api_requires_a_key() {
        let config = EmbeddingConfig {
            api_key_env: "MEDBOT_TEST_UNSET_KEY".into(),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            OpenAIEmbeddingProvider::from_config(&config),
            Err(RagError::ConfigError(_))
        ));
    }
}
