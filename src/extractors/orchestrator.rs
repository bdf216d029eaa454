use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::browser::{chrome::ChromeEngine, BrowserStrategy};
use super::embed::EmbedMetadataStrategy;
use super::remote_api::RemoteApiStrategy;
use super::{ContentRecord, ExtractionStrategy, StrategyError};
use crate::config::Config;
use crate::ReelError;

/// Diagnostic trace of one strategy invocation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionAttempt {
    pub strategy: String,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<ContentRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl ExtractionAttempt {
    fn accepted(strategy: &str, record: ContentRecord) -> Self {
        Self {
            strategy: strategy.to_string(),
            succeeded: true,
            record: Some(record),
            failure_reason: None,
        }
    }

    fn rejected(strategy: &str, record: Option<ContentRecord>, reason: impl Into<String>) -> Self {
        Self {
            strategy: strategy.to_string(),
            succeeded: false,
            record,
            failure_reason: Some(reason.into()),
        }
    }
}

/// Accepted record plus the trace of every strategy that was tried
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub record: ContentRecord,
    pub strategy: String,
    pub attempts: Vec<ExtractionAttempt>,
}

/// Runs extraction strategies in priority order until one is adequate
pub struct ExtractionOrchestrator {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
    call_timeout: Duration,
}

impl ExtractionOrchestrator {
    pub fn new(call_timeout: Duration) -> Self {
        Self {
            strategies: Vec::new(),
            call_timeout,
        }
    }

    /// Build the waterfall from configuration: remote API, browser, embed metadata.
    ///
    /// A strategy only takes part when it is enabled and its credential is present.
    pub fn from_config(config: &Config) -> Self {
        let mut orchestrator = Self::new(config.extraction.strategy_timeout());

        if let Some(strategy) = RemoteApiStrategy::from_config(config) {
            orchestrator.register(Box::new(strategy));
        } else {
            debug!("Remote API strategy skipped (disabled or no API key)");
        }

        if config.extraction.browser.enabled {
            let engine = ChromeEngine::from_config(&config.extraction.browser);
            orchestrator.register(Box::new(BrowserStrategy::from_config(engine, config)));
        }

        if config.extraction.embed.enabled {
            orchestrator.register(Box::new(EmbedMetadataStrategy::from_config(config)));
        }

        orchestrator
    }

    /// Append a strategy at the lowest priority
    pub fn register(&mut self, strategy: Box<dyn ExtractionStrategy>) {
        self.strategies.push(strategy);
    }

    /// Names of the registered strategies in priority order
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run the waterfall for one canonical URL.
    ///
    /// The first record with a video wins outright. Failing that, the first record
    /// with a caption is returned once every strategy has been tried. Records from
    /// different strategies are never merged.
    pub async fn extract(&self, url: &str) -> Result<ExtractionOutcome, ReelError> {
        let mut attempts = Vec::with_capacity(self.strategies.len());
        let mut caption_only: Option<(usize, ContentRecord)> = None;

        for strategy in &self.strategies {
            let name = strategy.name();
            let started = Instant::now();
            info!(strategy = name, url = %url, "Trying extraction strategy");

            let call = tokio::time::timeout(self.call_timeout, strategy.extract(url));
            let result = match call.await {
                Ok(result) => result,
                Err(_) => Err(StrategyError::TimedOut(self.call_timeout)),
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(record) if record.has_video() => {
                    info!(strategy = name, elapsed_ms, "Strategy returned a video, accepting");
                    attempts.push(ExtractionAttempt::accepted(name, record.clone()));
                    return Ok(ExtractionOutcome {
                        record,
                        strategy: name.to_string(),
                        attempts,
                    });
                }
                Ok(record) if record.has_caption() => {
                    info!(
                        strategy = name,
                        elapsed_ms,
                        "Strategy returned caption without video, continuing"
                    );
                    if caption_only.is_none() {
                        caption_only = Some((attempts.len(), record.clone()));
                    }
                    attempts.push(ExtractionAttempt::rejected(
                        name,
                        Some(record),
                        "no video asset",
                    ));
                }
                Ok(record) => {
                    warn!(
                        strategy = name,
                        elapsed_ms,
                        "Strategy returned neither caption nor video"
                    );
                    attempts.push(ExtractionAttempt::rejected(
                        name,
                        Some(record),
                        "no caption or video",
                    ));
                }
                Err(e) => {
                    let failure = ReelError::from_strategy(name, e);
                    warn!(strategy = name, elapsed_ms, error = %failure, "Strategy failed");
                    attempts.push(ExtractionAttempt::rejected(name, None, failure.to_string()));
                }
            }
        }

        if let Some((index, record)) = caption_only {
            let strategy = attempts[index].strategy.clone();
            attempts[index].succeeded = true;
            attempts[index].failure_reason = None;
            info!(strategy = %strategy, "No strategy found a video, accepting first caption");
            return Ok(ExtractionOutcome {
                record,
                strategy,
                attempts,
            });
        }

        let reasons = attempts
            .iter()
            .map(|a| {
                let reason = a.failure_reason.as_deref().unwrap_or("unknown");
                format!("{}: {}", a.strategy, reason)
            })
            .collect::<Vec<_>>()
            .join("; ");

        Err(ReelError::ExtractionExhausted(if reasons.is_empty() {
            "no extraction strategy configured".to_string()
        } else {
            reasons
        }))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Strategy returning a canned result and counting its invocations
    pub(crate) struct FixedStrategy {
        pub name: &'static str,
        pub result: Result<ContentRecord, StrategyError>,
        pub delay: Duration,
        pub calls: Arc<AtomicUsize>,
    }

    impl FixedStrategy {
        pub(crate) fn new(
            name: &'static str,
            result: Result<ContentRecord, StrategyError>,
        ) -> Self {
            Self {
                name,
                result,
                delay: Duration::ZERO,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl ExtractionStrategy for FixedStrategy {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn extract(&self, _url: &str) -> Result<ContentRecord, StrategyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.result.clone()
        }
    }

    const URL: &str = "https://www.instagram.com/reel/ABC123/";

    fn record(caption: &str, video: &str, author: &str) -> ContentRecord {
        let mut record = ContentRecord::new(URL).with_caption(caption);
        record.video_url = video.to_string();
        record.author.username = author.to_string();
        record
    }

    fn orchestrator(strategies: Vec<FixedStrategy>) -> ExtractionOrchestrator {
        let mut orchestrator = ExtractionOrchestrator::new(Duration::from_secs(5));
        for strategy in strategies {
            orchestrator.register(Box::new(strategy));
        }
        orchestrator
    }

    #[tokio::test]
    async fn test_first_record_with_video_wins_unmodified() {
        let empty = record("", "", "");
        let with_video = record("", "https://cdn/v.mp4", "second");
        let caption_only = record("third caption #x", "", "third");
        let third = FixedStrategy::new("embed", Ok(caption_only));
        let third_calls = third.calls.clone();

        let outcome = orchestrator(vec![
            FixedStrategy::new("remote_api", Ok(empty)),
            FixedStrategy::new("browser", Ok(with_video.clone())),
            third,
        ])
        .extract(URL)
        .await
        .unwrap();

        assert_eq!(outcome.record, with_video);
        assert_eq!(outcome.strategy, "browser");
        assert_eq!(outcome.attempts.len(), 2);
        assert!(!outcome.attempts[0].succeeded);
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_video_beats_earlier_caption() {
        let caption_only = record("caption", "", "first");
        let with_video = record("", "https://cdn/v.mp4", "second");

        let outcome = orchestrator(vec![
            FixedStrategy::new("remote_api", Ok(caption_only)),
            FixedStrategy::new("browser", Ok(with_video.clone())),
        ])
        .extract(URL)
        .await
        .unwrap();

        assert_eq!(outcome.record, with_video);
        assert_eq!(outcome.record.caption, "");
        assert_eq!(outcome.record.author.username, "second");
    }

    #[tokio::test]
    async fn test_first_caption_accepted_when_no_video() {
        let first_caption = record("first caption", "", "first");
        let second_caption = record("second caption", "", "second");

        let outcome = orchestrator(vec![
            FixedStrategy::new("remote_api", Err(StrategyError::RateLimited("rapidapi".into()))),
            FixedStrategy::new("browser", Ok(first_caption.clone())),
            FixedStrategy::new("embed", Ok(second_caption)),
        ])
        .extract(URL)
        .await
        .unwrap();

        assert_eq!(outcome.record, first_caption);
        assert_eq!(outcome.strategy, "browser");
        assert_eq!(outcome.attempts.len(), 3);
        assert!(outcome.attempts[1].succeeded);
        assert!(outcome.attempts[0]
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("Rate limited"));
    }

    #[tokio::test]
    async fn test_exhausted_when_all_blank() {
        let result = orchestrator(vec![
            FixedStrategy::new("remote_api", Ok(record("", "", ""))),
            FixedStrategy::new("browser", Ok(record("", "", ""))),
            FixedStrategy::new("embed", Ok(record("", "", ""))),
        ])
        .extract(URL)
        .await;

        match result {
            Err(ReelError::ExtractionExhausted(reasons)) => {
                assert!(reasons.contains("remote_api"));
                assert!(reasons.contains("embed"));
            }
            other => panic!("expected ExtractionExhausted, got {:?}", other.map(|o| o.strategy)),
        }
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_waterfall() {
        let with_video = record("c", "https://cdn/v.mp4", "x");
        let outcome = orchestrator(vec![
            FixedStrategy::new("remote_api", Err(StrategyError::Auth("rapidapi".into()))),
            FixedStrategy::new("browser", Err(StrategyError::Blocked)),
            FixedStrategy::new("embed", Ok(with_video.clone())),
        ])
        .extract(URL)
        .await
        .unwrap();

        assert_eq!(outcome.record, with_video);
        assert_eq!(outcome.attempts.len(), 3);
    }

    #[tokio::test]
    async fn test_hung_strategy_times_out() {
        let mut slow = FixedStrategy::new("browser", Ok(record("", "https://cdn/v.mp4", "")));
        slow.delay = Duration::from_secs(60);
        let caption = record("caption", "", "");

        let mut orchestrator = ExtractionOrchestrator::new(Duration::from_millis(20));
        orchestrator.register(Box::new(slow));
        orchestrator.register(Box::new(FixedStrategy::new("embed", Ok(caption.clone()))));

        let outcome = orchestrator.extract(URL).await.unwrap();
        assert_eq!(outcome.record, caption);
        assert!(outcome.attempts[0]
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("timed out"));
    }

    #[tokio::test]
    async fn test_no_strategies_is_exhausted() {
        let result = ExtractionOrchestrator::new(Duration::from_secs(1)).extract(URL).await;
        assert!(matches!(result, Err(ReelError::ExtractionExhausted(_))));
    }
}
