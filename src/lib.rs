//! ReelScribe - A Rust CLI tool for extracting reel metadata and transcripts
//!
//! This library locates caption, hashtags, engagement counts, author and video asset
//! of an Instagram reel through a waterfall of extraction strategies, then optionally
//! downloads the video, extracts its audio track and transcribes it.

pub mod cli;
pub mod config;
pub mod extractors;
pub mod media;
pub mod output;
pub mod pipeline;
pub mod transcribe;
pub mod utils;

pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use extractors::{ContentRecord, ExtractionOrchestrator, ExtractionStrategy};
pub use pipeline::{OutputRecord, PipelineInput, ReelPipeline};
pub use transcribe::TranscriptionClient;

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to the reel pipeline
#[derive(thiserror::Error, Debug)]
pub enum ReelError {
    #[error("Invalid Instagram Reel URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Strategy {strategy} failed: {cause}")]
    StrategyFailure {
        strategy: String,
        cause: extractors::StrategyError,
    },

    #[error("Rate limited by {0}")]
    RateLimited(String),

    #[error("Authentication rejected by {0}")]
    AuthError(String),

    #[error("Failed to extract reel data: {0}")]
    ExtractionExhausted(String),

    #[error("Failed to download video: {0}")]
    DownloadError(String),

    #[error("{0} is not installed or not available in PATH")]
    ToolUnavailable(String),

    #[error("Failed to extract audio: {0}")]
    AudioExtractionError(String),

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("Transcription timed out after {0} polls")]
    TranscriptionTimedOut(u32),
}

impl From<transcribe::TranscriptionError> for ReelError {
    fn from(err: transcribe::TranscriptionError) -> Self {
        match err {
            transcribe::TranscriptionError::TimedOut { polls } => {
                ReelError::TranscriptionTimedOut(polls)
            }
            other => ReelError::TranscriptionFailed(other.to_string()),
        }
    }
}

impl ReelError {
    /// Lift a strategy failure into the top-level taxonomy, keeping the
    /// rate-limit and auth distinctions visible to callers.
    pub fn from_strategy(strategy: &str, cause: extractors::StrategyError) -> Self {
        match cause {
            extractors::StrategyError::RateLimited(provider) => ReelError::RateLimited(provider),
            extractors::StrategyError::Auth(provider) => ReelError::AuthError(provider),
            cause => ReelError::StrategyFailure {
                strategy: strategy.to_string(),
                cause,
            },
        }
    }
}
