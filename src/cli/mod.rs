use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::Credentials;

#[derive(Parser)]
#[command(
    name = "reelscribe",
    about = "ReelScribe - Extract caption, engagement, author and transcript from Instagram reels",
    version,
    long_about = "Extracts structured metadata from Instagram reels through a waterfall of sources (remote API, headless browser, public embed endpoint), then optionally downloads the video and transcribes its audio with OpenAI Whisper or AssemblyAI."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty", global = true)]
    pub log_format: LogFormat,

    /// Configuration file (defaults to ./config.yaml or the user config dir)
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub keys: KeyArgs,
}

/// Credentials and proxy opt-in, usually supplied through the environment
#[derive(Args, Clone, Default)]
pub struct KeyArgs {
    /// RapidAPI key for the remote API strategy
    #[arg(long, env = "RAPIDAPI_KEY", hide_env_values = true, global = true)]
    pub rapidapi_key: Option<String>,

    /// OpenAI key for Whisper transcription
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    pub openai_api_key: Option<String>,

    /// AssemblyAI key for asynchronous transcription
    #[arg(long, env = "ASSEMBLYAI_API_KEY", hide_env_values = true, global = true)]
    pub assemblyai_api_key: Option<String>,

    /// Route browser traffic through a proxy
    #[arg(long, env = "REELSCRIBE_USE_PROXY", global = true)]
    pub use_proxy: bool,

    /// Pre-provisioned proxy URL
    #[arg(long, env = "REELSCRIBE_PROXY_URL", value_name = "URL", global = true)]
    pub proxy_url: Option<String>,
}

impl KeyArgs {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            rapidapi_key: self.rapidapi_key.clone(),
            openai_api_key: self.openai_api_key.clone(),
            assemblyai_api_key: self.assemblyai_api_key.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract metadata (and transcripts) for one or more reel URLs
    Run {
        /// Reel URLs to process
        #[arg(value_name = "URL")]
        urls: Vec<String>,

        /// JSON input file: {"reelUrls": [...], "includeTranscript": true}
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Skip download and transcription
        #[arg(long)]
        no_transcript: bool,
    },

    /// Show or initialise the configuration file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,

        /// Write the default configuration file
        #[arg(long)]
        init: bool,
    },

    /// List extraction strategies in waterfall order
    Strategies,
}

#[derive(ValueEnum, Clone, Debug)]
pub enum OutputFormat {
    /// Pretty JSON array
    Json,
    /// One JSON record per line
    Jsonl,
    /// Human-readable report
    Text,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Jsonl => write!(f, "jsonl"),
            OutputFormat::Text => write!(f, "text"),
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}
