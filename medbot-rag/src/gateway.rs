//! Construction of embedding and generation providers from configuration.

use std::sync::Arc;

use tracing::info;

use crate::config::{EmbeddingBackend, EmbeddingConfig, GenerationBackend, GenerationConfig};
use crate::embedding::{EmbeddingProvider, HashingEmbeddingProvider};
use crate::error::{RagError, Result};
use crate::generation::{GenerationProvider, MockGenerationProvider};

/// Build the embedding provider selected by `config`.
///
/// # Errors
///
/// Returns [`RagError::ConfigError`] for invalid settings or when the selected
/// backend was not compiled in.
pub fn embedding_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider {
        EmbeddingBackend::Hashing => Arc::new(HashingEmbeddingProvider::new(config.dimensions)?),
        EmbeddingBackend::OpenAI => openai_embedding(config)?,
    };
    info!(
        backend = ?config.provider,
        model = provider.model_id(),
        dimensions = provider.dimensions(),
        "embedding provider ready"
    );
    Ok(provider)
}

/// Build the generation provider selected by `config`.
///
/// # Errors
///
/// Returns [`RagError::ConfigError`] for invalid settings, an empty script for
/// the scripted backend, or a backend that was not compiled in.
pub fn generation_from_config(config: &GenerationConfig) -> Result<Arc<dyn GenerationProvider>> {
    config.validate()?;
    let provider: Arc<dyn GenerationProvider> = match config.provider {
        GenerationBackend::Scripted => {
            if config.script.is_empty() {
                return Err(RagError::ConfigError(
                    "scripted generation requires a non-empty script".to_string(),
                ));
            }
            Arc::new(MockGenerationProvider::new(config.script.iter().cloned()))
        }
        GenerationBackend::OpenAI => openai_generation(config)?,
    };
    info!(
        backend = ?config.provider,
        name = provider.name(),
        max_tokens = config.max_tokens,
        temperature = config.temperature,
        "generation provider ready"
    );
    Ok(provider)
}

#[cfg(feature = "openai")]
fn openai_embedding(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    Ok(Arc::new(crate::openai::OpenAIEmbeddingProvider::from_config(config)?))
}

#[cfg(not(feature = "openai"))]
fn openai_embedding(_config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    Err(RagError::ConfigError(
        "the `openai` feature is required for this embedding provider".into(),
    ))
}

#[cfg(feature = "openai")]
fn openai_generation(config: &GenerationConfig) -> Result<Arc<dyn GenerationProvider>> {
    Ok(Arc::new(crate::openai::OpenAIGenerationProvider::from_config(config)?))
}

#[cfg(not(feature = "openai"))]
fn openai_generation(_config: &GenerationConfig) -> Result<Arc<dyn GenerationProvider>> {
    Err(RagError::ConfigError(
        "the `openai` feature is required for this generation provider".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_embedding_config_builds_hashing_provider() {
        let provider = embedding_from_config(&EmbeddingConfig::default()).unwrap();
        assert_eq!(provider.dimensions(), 384);
        assert_eq!(provider.model_id(), "hashing-sha256-384");
    }

    #[test]
    fn hashing_provider_ignores_model_and_device() {
        let config = EmbeddingConfig {
            model: "all-minilm".into(),
            device: "cuda".into(),
            dimensions: 64,
            ..EmbeddingConfig::default()
        };
        let provider = embedding_from_config(&config).unwrap();
        assert_eq!(provider.model_id(), "hashing-sha256-64");
    }

    #[test]
    fn scripted_generation_uses_the_script() {
        let config = GenerationConfig {
            provider: GenerationBackend::Scripted,
            script: vec!["FINAL".into(), "ANSWER".into(), "ok".into()],
            ..GenerationConfig::default()
        };
        assert_eq!(generation_from_config(&config).unwrap().name(), "mock");
    }

    #[test]
    fn scripted_generation_without_script_is_rejected() {
        let config = GenerationConfig {
            provider: GenerationBackend::Scripted,
            ..GenerationConfig::default()
        };
        assert!(matches!(generation_from_config(&config), Err(RagError::ConfigError(_))));
    }

    #[test]
    fn invalid_sampling_parameters_are_rejected_first() {
        let config = GenerationConfig { temperature: 5.0, ..GenerationConfig::default() };
        assert!(matches!(generation_from_config(&config), Err(RagError::ConfigError(_))));
    }
}
