//! Generation provider trait for streaming text from a generative model.

use std::pin::Pin;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::{Stream, StreamExt, stream};

use crate::error::{RagError, Result};

/// A lazy stream of generated text tokens.
///
/// The stream ends when the model signals completion; there is no terminating
/// marker token. Dropping the stream tells the backend to stop producing.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A provider that turns a prompt into a stream of tokens.
///
/// Each call to [`generate`](GenerationProvider::generate) starts a fresh,
/// independent stream.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Name of the backing model, for logging.
    fn name(&self) -> &str;

    /// Start generating a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<TokenStream>;
}

/// A [`GenerationProvider`] that replays a fixed token script.
///
/// Useful for tests and offline demos. The provider records every prompt it
/// receives so tests can assert on prompt assembly.
///
/// # Example
///
/// ```rust,ignore
/// use medbot_rag::MockGenerationProvider;
///
/// let provider = MockGenerationProvider::new(["FINAL", "ANSWER", "42"]);
/// ```
#[derive(Debug, Default)]
pub struct MockGenerationProvider {
    tokens: Vec<String>,
    never_finish: bool,
    failure: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl MockGenerationProvider {
    /// Create a provider that yields `tokens` and then ends the stream.
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { tokens: tokens.into_iter().map(Into::into).collect(), ..Self::default() }
    }

    /// Keep the stream open forever after the scripted tokens.
    pub fn never_finish(mut self) -> Self {
        self.never_finish = true;
        self
    }

    /// Fail with a [`RagError::GenerationError`] after the scripted tokens.
    pub fn fail_with(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl GenerationProvider for MockGenerationProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, prompt: &str) -> Result<TokenStream> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let scripted = stream::iter(self.tokens.clone().into_iter().map(Ok));
        let tail: TokenStream = match (&self.failure, self.never_finish) {
            (Some(message), _) => {
                let error = RagError::GenerationError {
                    provider: "mock".to_string(),
                    message: message.clone(),
                };
                Box::pin(stream::once(futures::future::ready(Err(error))))
            }
            (None, true) => Box::pin(stream::pending()),
            (None, false) => Box::pin(stream::empty()),
        };
        Ok(Box::pin(scripted.chain(tail)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_script_and_records_prompt() {
        let provider = MockGenerationProvider::new(["a", "b"]);
        let tokens: Vec<String> = provider
            .generate("prompt")
            .await
            .unwrap()
            .map(|t| t.unwrap())
            .collect()
            .await;
        assert_eq!(tokens, vec!["a", "b"]);
        assert_eq!(provider.prompts(), vec!["prompt"]);
    }

    #[tokio::test]
    async fn each_call_restarts_the_script() {
        let provider = MockGenerationProvider::new(["x"]);
        for _ in 0..2 {
            let tokens: Vec<_> = provider.generate("p").await.unwrap().collect().await;
            assert_eq!(tokens.len(), 1);
        }
    }

    #[tokio::test]
    async fn failure_follows_the_script() {
        let provider = MockGenerationProvider::new(["partial"]).fail_with("model crashed");
        let items: Vec<_> = provider.generate("p").await.unwrap().collect().await;
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(RagError::GenerationError { .. })));
    }
}
