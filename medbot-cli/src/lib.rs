//! Command-line front end for Medbot.
//!
//! `medbot ingest` builds the vector index from a corpus directory,
//! `medbot ask` answers a single question, and `medbot chat` runs an
//! interactive session. See [`settings::MedbotConfig`] for the configuration
//! file format.

pub mod cli;
pub mod commands;
pub mod settings;
pub mod telemetry;

pub use cli::{Cli, Command};
pub use settings::{MedbotConfig, Overrides};
