use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod browser;
pub mod embed;
pub mod orchestrator;
pub mod remote_api;

pub use orchestrator::{ExtractionAttempt, ExtractionOrchestrator, ExtractionOutcome};

use crate::utils::extract_hashtags;

/// Reel author as reported by the source that produced the record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub username: String,
    pub full_name: String,
}

/// Metadata of a single reel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRecord {
    /// Canonical reel URL
    pub url: String,

    /// Caption text, empty when not found
    pub caption: String,

    /// `#tags` found in the caption, in order
    pub hashtags: Vec<String>,

    pub author: Author,

    pub view_count: u64,
    pub like_count: u64,
    pub comment_count: u64,

    /// Direct video asset URL, empty when not found
    pub video_url: String,

    /// ISO-8601 timestamp
    pub timestamp: String,
}

impl ContentRecord {
    /// Create an empty record for `url` stamped with the current time
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            ..Default::default()
        }
    }

    /// Set the caption and re-derive the hashtags from it
    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = caption.into();
        self.hashtags = extract_hashtags(&self.caption);
        self
    }

    /// A video asset was located, so the record can feed transcription
    pub fn has_video(&self) -> bool {
        !self.video_url.is_empty()
    }

    pub fn has_caption(&self) -> bool {
        !self.caption.is_empty()
    }

    /// Usable by the orchestrator: either a caption or a video was found
    pub fn is_successful(&self) -> bool {
        self.has_caption() || self.has_video()
    }

    /// Nothing recovered at all, which usually means the page was blocked
    pub fn is_blank(&self) -> bool {
        !self.has_caption() && !self.has_video() && self.view_count == 0
    }
}

/// Why a single strategy did not produce a record
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StrategyError {
    #[error("rate limit exceeded at {0}")]
    RateLimited(String),

    #[error("credentials rejected by {0}")]
    Auth(String),

    #[error("{provider} returned HTTP {status}")]
    Http { provider: String, status: u16 },

    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error("no data extracted, likely login wall or blocked")]
    Blocked,

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("strategy unavailable: {0}")]
    Unavailable(String),
}

impl StrategyError {
    /// Map a non-success HTTP status into the matching failure
    pub fn from_status(provider: &str, status: StatusCode) -> Self {
        match status {
            StatusCode::TOO_MANY_REQUESTS => StrategyError::RateLimited(provider.to_string()),
            StatusCode::FORBIDDEN => StrategyError::Auth(provider.to_string()),
            status => StrategyError::Http {
                provider: provider.to_string(),
                status: status.as_u16(),
            },
        }
    }
}

impl From<reqwest::Error> for StrategyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StrategyError::Request(format!("timeout: {}", err))
        } else if err.is_decode() {
            StrategyError::InvalidResponse(err.to_string())
        } else {
            StrategyError::Request(err.to_string())
        }
    }
}

/// One independent way of obtaining reel metadata
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    /// Stable name used in logs and diagnostics
    fn name(&self) -> &'static str;

    /// Extract a best-effort record for an already canonicalized reel URL
    async fn extract(&self, url: &str) -> Result<ContentRecord, StrategyError>;
}

/// Build the shared HTTP client used by the API-backed strategies
pub(crate) fn http_client(
    user_agent: &str,
    timeout: Duration,
) -> Result<reqwest::Client, StrategyError> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .map_err(|e| StrategyError::Unavailable(format!("could not build HTTP client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_caption_derives_hashtags() {
        let record =
            ContentRecord::new("https://instagram.com/reel/A").with_caption("Hi #one #two");
        assert_eq!(record.hashtags, vec!["#one", "#two"]);
        assert!(record.has_caption());
        assert!(!record.has_video());
        assert!(record.is_successful());
    }

    #[test]
    fn test_blank_record() {
        let mut record = ContentRecord::new("https://instagram.com/reel/A");
        assert!(record.is_blank());
        assert!(!record.is_successful());

        record.view_count = 10;
        assert!(!record.is_blank());
        assert!(!record.is_successful());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            StrategyError::from_status("api", StatusCode::TOO_MANY_REQUESTS),
            StrategyError::RateLimited("api".into())
        );
        assert_eq!(
            StrategyError::from_status("api", StatusCode::FORBIDDEN),
            StrategyError::Auth("api".into())
        );
        assert_eq!(
            StrategyError::from_status("api", StatusCode::BAD_GATEWAY),
            StrategyError::Http { provider: "api".into(), status: 502 }
        );
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let mut record = ContentRecord::new("https://instagram.com/reel/A").with_caption("c");
        record.video_url = "https://cdn/v.mp4".into();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["videoUrl"], "https://cdn/v.mp4");
        assert_eq!(json["author"]["fullName"], "");
    }
}
