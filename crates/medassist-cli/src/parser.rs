//! Command-line parser and global options.

use clap::{Parser, Subcommand};
use medassist_core::SettingsUpdate;

/// Command-line client for a local, Ollama-backed medical assistant.
#[derive(Debug, Parser)]
#[command(name = "medassist")]
#[command(about = "Ask a local AI model medical questions, with automatic endpoint fallback")]
#[command(version)]
pub struct Cli {
    /// Inference service URL tried before the platform defaults
    #[arg(long, env = "MEDASSIST_OLLAMA_URL", global = true)]
    pub endpoint: Option<String>,

    /// Model to generate with (default: picked from the installed models)
    #[arg(long, env = "MEDASSIST_MODEL", global = true)]
    pub model: Option<String>,

    /// Attempts per question before giving up (1-10)
    #[arg(long = "max-attempts", env = "MEDASSIST_MAX_ATTEMPTS", global = true)]
    pub max_attempts: Option<u32>,

    /// Pretend to run on another platform (e.g. "windows", a user agent)
    #[arg(long = "host", global = true)]
    pub host: Option<String>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Look for the inference service once and report what was found
    Status,

    /// Ask one medical question
    Ask {
        /// The question
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Keep checking the service and print every connectivity change
    Watch,

    /// Print the resolved platform profile as JSON
    Profile,
}

impl Cli {
    /// Flag overrides, layered on top of the environment settings.
    pub fn settings_update(&self) -> SettingsUpdate {
        SettingsUpdate {
            endpoint: self.endpoint.clone().map(Some),
            model: self.model.clone().map(Some),
            max_attempts: self.max_attempts.map(Some),
            ..Default::default()
        }
    }
}
