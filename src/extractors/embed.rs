use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::{http_client, Author, ContentRecord, ExtractionStrategy, StrategyError};
use crate::config::Config;

#[derive(Debug, Deserialize)]
struct OEmbedResponse {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author_name: Option<String>,
}

/// Public oEmbed endpoint; yields caption, hashtags and author only
pub struct EmbedMetadataStrategy {
    client: Client,
    endpoint: String,
}

impl EmbedMetadataStrategy {
    pub fn new(client: Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }

    pub fn from_config(config: &Config) -> Self {
        let settings = &config.extraction.embed;
        // Only fails on a broken TLS backend
        let client =
            http_client(&config.extraction.user_agent, settings.timeout()).unwrap_or_default();
        Self::new(client, settings.endpoint.clone())
    }
}

#[async_trait]
impl ExtractionStrategy for EmbedMetadataStrategy {
    fn name(&self) -> &'static str {
        "embed"
    }

    async fn extract(&self, url: &str) -> Result<ContentRecord, StrategyError> {
        let request_url = format!("{}?url={}", self.endpoint, urlencoding::encode(url));
        debug!(endpoint = %self.endpoint, "Requesting oEmbed metadata");

        let response = self.client.get(&request_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StrategyError::from_status("oembed", status));
        }

        let body: OEmbedResponse = response.json().await?;
        let author_name = body.author_name.unwrap_or_default();

        let mut record = ContentRecord::new(url).with_caption(body.title.unwrap_or_default());
        record.author = Author {
            username: author_name.clone(),
            full_name: author_name,
        };

        info!(
            has_caption = record.has_caption(),
            author = %record.author.username,
            "Got data from oEmbed endpoint"
        );
        Ok(record)
    }
}
