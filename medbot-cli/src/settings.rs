//! Layered configuration for the `medbot` binary.
//!
//! Built-in defaults are overlaid by an optional TOML file and then by
//! command-line flags (which clap may in turn fill from environment variables).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use medbot_rag::{
    AnswerConfig, DEFAULT_GLOB, EmbeddingConfig, GenerationConfig, PromptTemplate, RagConfig,
};
use serde::{Deserialize, Serialize};

/// Default corpus directory.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Default index location.
pub const DEFAULT_INDEX_PATH: &str = "vectorstore/db_index";

/// Everything the binary needs to ingest and answer.
///
/// # Example
///
/// ```toml
/// data_dir = "corpus"
///
/// [rag]
/// top_k = 3
///
/// [generation]
/// base_url = "http://localhost:11434/v1"
/// model = "llama2:7b-chat"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MedbotConfig {
    /// Directory the corpus is read from.
    pub data_dir: PathBuf,
    /// Glob selecting corpus files relative to `data_dir`.
    pub glob: String,
    /// Directory the index is saved to and loaded from.
    pub index_path: PathBuf,
    /// Chunking and retrieval.
    pub rag: RagConfig,
    /// Answer extraction. Streams every token by default, since the built-in
    /// prompt does not ask the model for an answer prefix.
    pub answer: AnswerConfig,
    /// Embedding gateway.
    pub embedding: EmbeddingConfig,
    /// Generation gateway.
    pub generation: GenerationConfig,
    /// Custom prompt template with `{context}` and `{question}` placeholders.
    pub prompt_template: Option<String>,
}

impl Default for MedbotConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            glob: DEFAULT_GLOB.to_string(),
            index_path: PathBuf::from(DEFAULT_INDEX_PATH),
            rag: RagConfig::default(),
            answer: AnswerConfig::stream_from_start(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            prompt_template: None,
        }
    }
}

/// Values given on the command line, applied last.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub data_dir: Option<PathBuf>,
    pub glob: Option<String>,
    pub index_path: Option<PathBuf>,
    pub top_k: Option<usize>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

impl MedbotConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).context("invalid configuration")?;
        Ok(config)
    }

    /// Load the file at `path`, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                Self::from_toml_str(&contents)
                    .with_context(|| format!("failed to parse config file {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply command-line overrides.
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(data_dir) = overrides.data_dir {
            self.data_dir = data_dir;
        }
        if let Some(glob) = overrides.glob {
            self.glob = glob;
        }
        if let Some(index_path) = overrides.index_path {
            self.index_path = index_path;
        }
        if let Some(top_k) = overrides.top_k {
            self.rag.top_k = top_k;
        }
        if let Some(model) = overrides.model {
            self.generation.model = model;
        }
        if let Some(base_url) = overrides.base_url {
            self.generation.base_url = Some(base_url);
        }
    }

    /// Check every section before any work starts.
    pub fn validate(&self) -> Result<()> {
        self.rag.validate().context("invalid [rag] section")?;
        self.generation.validate().context("invalid [generation] section")?;
        self.prompt()?;
        Ok(())
    }

    /// The configured prompt template, or the built-in one.
    pub fn prompt(&self) -> Result<PromptTemplate> {
        match &self.prompt_template {
            Some(template) => {
                PromptTemplate::new(template.clone()).context("invalid prompt_template")
            }
            None => Ok(PromptTemplate::default()),
        }
    }
}
