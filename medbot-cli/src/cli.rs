//! Command-line arguments.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::settings::Overrides;

/// Medbot: answers medical questions from your own document corpus.
#[derive(Parser, Debug)]
#[command(name = "medbot", version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "MEDBOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Index directory
    #[arg(long, global = true, env = "MEDBOT_INDEX")]
    pub index: Option<PathBuf>,

    /// Generation model name
    #[arg(short, long, global = true, env = "MEDBOT_MODEL")]
    pub model: Option<String>,

    /// Base URL of an OpenAI-compatible server (e.g. http://localhost:11434/v1)
    #[arg(long, global = true, env = "MEDBOT_BASE_URL")]
    pub base_url: Option<String>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the vector index from the corpus
    Ingest {
        /// Corpus directory
        #[arg(long, env = "MEDBOT_DATA")]
        data: Option<PathBuf>,

        /// Glob selecting corpus files (default "**/*.{pdf,txt}")
        #[arg(long)]
        glob: Option<String>,
    },
    /// Answer one question and exit
    Ask {
        /// The question
        question: String,

        /// Print the answer and its sources as JSON
        #[arg(long)]
        json: bool,

        /// Number of chunks to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// Start an interactive chat
    Chat {
        /// Number of chunks to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// Describe the saved index
    Info,
}

impl Cli {
    /// Flag values that override the configuration file.
    pub fn overrides(&self) -> Overrides {
        let mut overrides = Overrides {
            index_path: self.index.clone(),
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            ..Overrides::default()
        };
        match &self.command {
            Command::Ingest { data, glob } => {
                overrides.data_dir = data.clone();
                overrides.glob = glob.clone();
            }
            Command::Ask { top_k, .. } | Command::Chat { top_k } => overrides.top_k = *top_k,
            Command::Info => {}
        }
        overrides
    }
}
