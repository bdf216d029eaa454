use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use super::{http_client, Author, ContentRecord, ExtractionStrategy, StrategyError};
use crate::config::Config;
use crate::utils::json_count;

/// Response layout of a metadata provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProviderShape {
    /// Flat object with field name variants across provider versions
    Downloader,
    /// Object nested under `data` with a structured caption
    Scraper,
}

#[derive(Debug, Clone)]
struct Provider {
    endpoint: String,
    query_param: &'static str,
    shape: ProviderShape,
}

impl Provider {
    fn host(&self) -> String {
        Url::parse(&self.endpoint)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default()
    }
}

/// Structured-data API strategy backed by two RapidAPI providers.
///
/// The secondary provider is only consulted when the primary one fails, and the
/// primary provider's error is reported when both fail.
pub struct RemoteApiStrategy {
    client: Client,
    api_key: String,
    primary: Provider,
    secondary: Provider,
}

impl RemoteApiStrategy {
    pub fn new(
        client: Client,
        api_key: String,
        primary_endpoint: String,
        secondary_endpoint: String,
    ) -> Self {
        Self {
            client,
            api_key,
            primary: Provider {
                endpoint: primary_endpoint,
                query_param: "url",
                shape: ProviderShape::Downloader,
            },
            secondary: Provider {
                endpoint: secondary_endpoint,
                query_param: "code_or_id_or_url",
                shape: ProviderShape::Scraper,
            },
        }
    }

    /// Returns `None` when the strategy is disabled or no API key is configured
    pub fn from_config(config: &Config) -> Option<Self> {
        let settings = &config.extraction.remote_api;
        if !settings.enabled {
            return None;
        }
        if !config.credentials.has_rapidapi() {
            return None;
        }
        let api_key = config.credentials.rapidapi_key.as_deref()?.trim().to_string();

        let client = match http_client(&config.extraction.user_agent, settings.timeout()) {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "Remote API strategy unavailable");
                return None;
            }
        };

        Some(Self::new(
            client,
            api_key,
            settings.primary_url.clone(),
            settings.secondary_url.clone(),
        ))
    }

    async fn fetch(&self, provider: &Provider, url: &str) -> Result<ContentRecord, StrategyError> {
        let host = provider.host();
        debug!(host = %host, "Requesting reel data from provider");

        let response = self
            .client
            .get(&provider.endpoint)
            .query(&[(provider.query_param, url)])
            .header("X-RapidAPI-Key", &self.api_key)
            .header("X-RapidAPI-Host", &host)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StrategyError::from_status(&host, status));
        }

        let body: Value = response.json().await?;
        let record = match provider.shape {
            ProviderShape::Downloader => map_downloader_response(url, &body)?,
            ProviderShape::Scraper => map_scraper_response(url, &body)?,
        };

        if !record.is_successful() {
            return Err(StrategyError::InvalidResponse(format!(
                "{} returned no caption or video",
                host
            )));
        }

        info!(
            host = %host,
            has_video = record.has_video(),
            has_caption = record.has_caption(),
            views = record.view_count,
            author = %record.author.username,
            "Provider returned reel data"
        );
        Ok(record)
    }
}

#[async_trait]
impl ExtractionStrategy for RemoteApiStrategy {
    fn name(&self) -> &'static str {
        "remote_api"
    }

    async fn extract(&self, url: &str) -> Result<ContentRecord, StrategyError> {
        let primary_error = match self.fetch(&self.primary, url).await {
            Ok(record) => return Ok(record),
            Err(e) => e,
        };

        warn!(error = %primary_error, "Primary provider failed, trying alternative");
        match self.fetch(&self.secondary, url).await {
            Ok(record) => Ok(record),
            Err(secondary_error) => {
                warn!(error = %secondary_error, "All remote API providers failed");
                Err(primary_error)
            }
        }
    }
}

/// First non-empty string among the JSON pointers
fn first_str(body: &Value, pointers: &[&str]) -> String {
    pointers
        .iter()
        .filter_map(|p| body.pointer(p).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// First positive count among the JSON pointers, 0 otherwise
fn first_count(body: &Value, pointers: &[&str]) -> u64 {
    pointers
        .iter()
        .filter_map(|p| body.pointer(p).and_then(json_count))
        .find(|n| *n > 0)
        .unwrap_or(0)
}

fn epoch_to_iso(seconds: &Value) -> Option<String> {
    let seconds = json_count(seconds)?;
    chrono::DateTime::from_timestamp(i64::try_from(seconds).ok()?, 0).map(|dt| dt.to_rfc3339())
}

fn map_downloader_response(url: &str, body: &Value) -> Result<ContentRecord, StrategyError> {
    if !body.is_object() {
        return Err(StrategyError::InvalidResponse("no data returned".to_string()));
    }

    let mut record = ContentRecord::new(url).with_caption(first_str(body, &["/caption", "/title"]));
    record.video_url = first_str(body, &["/video_url", "/media/0/url", "/url"]);
    record.view_count = first_count(body, &["/video_view_count", "/views"]);
    record.like_count = first_count(body, &["/like_count", "/likes"]);
    record.comment_count = first_count(body, &["/comment_count", "/comments"]);
    record.author = Author {
        username: first_str(body, &["/username", "/owner/username"]),
        full_name: first_str(body, &["/owner/full_name", "/owner_full_name"]),
    };
    if let Some(timestamp) = body.get("taken_at_timestamp").and_then(epoch_to_iso) {
        record.timestamp = timestamp;
    }

    Ok(record)
}

fn map_scraper_response(url: &str, body: &Value) -> Result<ContentRecord, StrategyError> {
    let data = body
        .get("data")
        .filter(|d| d.is_object())
        .ok_or_else(|| StrategyError::InvalidResponse("no data from alternative API".to_string()))?;

    let mut record = ContentRecord::new(url).with_caption(first_str(data, &["/caption/text"]));
    record.video_url = first_str(data, &["/video_url"]);
    record.view_count = first_count(data, &["/video_view_count"]);
    record.like_count = first_count(data, &["/like_count"]);
    record.comment_count = first_count(data, &["/comment_count"]);
    record.author = Author {
        username: first_str(data, &["/owner/username"]),
        full_name: first_str(data, &["/owner/full_name"]),
    };

    Ok(record)
}
