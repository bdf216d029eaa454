//! Per-URL driver: validate, extract, then download, demux and transcribe.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::extractors::{Author, ContentRecord, ExtractionOrchestrator};
use crate::media::{AudioExtractor, MediaDownloader};
use crate::transcribe::TranscriptionClient;
use crate::utils::{canonicalize_url, run_identifier, validate_reel_url};
use crate::ReelError;

const NO_SPEECH: &str = "No speech detected";

/// Job input: `{"reelUrls": [...], "includeTranscript": true}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineInput {
    pub reel_urls: Vec<String>,
    #[serde(default = "default_include_transcript")]
    pub include_transcript: bool,
}

fn default_include_transcript() -> bool {
    true
}

impl PipelineInput {
    pub fn new(reel_urls: Vec<String>, include_transcript: bool) -> Self {
        Self {
            reel_urls,
            include_transcript,
        }
    }

    /// Parse a job input document.
    ///
    /// Non-string entries are kept as their JSON text so they surface as per-URL failures.
    pub fn from_json(content: &str) -> Result<Self, ReelError> {
        let value: Value = serde_json::from_str(content)
            .map_err(|e| ReelError::InvalidInput(format!("input is not valid JSON: {}", e)))?;

        let urls = value
            .get("reelUrls")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ReelError::InvalidInput("reelUrls must be an array of URLs".to_string())
            })?;

        let reel_urls = urls
            .iter()
            .map(|u| u.as_str().map(str::to_string).unwrap_or_else(|| u.to_string()))
            .collect();

        let include_transcript = value
            .get("includeTranscript")
            .and_then(Value::as_bool)
            .unwrap_or_else(default_include_transcript);

        let input = Self::new(reel_urls, include_transcript);
        input.validate()?;
        Ok(input)
    }

    pub fn validate(&self) -> Result<(), ReelError> {
        if self.reel_urls.is_empty() {
            return Err(ReelError::InvalidInput(
                "reelUrls must contain at least one URL".to_string(),
            ));
        }
        Ok(())
    }
}

/// One emitted record per input URL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRecord {
    pub url: String,
    pub caption: String,
    pub hashtags: Vec<String>,
    pub view_count: u64,
    pub like_count: u64,
    pub comment_count: u64,
    pub video_url: String,
    pub author: Author,
    pub timestamp: String,
    pub transcript: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription_error: Option<String>,
    /// Strategy whose record was accepted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl OutputRecord {
    pub fn failed(url: &str, error: &ReelError) -> Self {
        Self {
            url: url.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            success: false,
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    pub fn extracted(record: ContentRecord, source: &str) -> Self {
        Self {
            url: record.url,
            caption: record.caption,
            hashtags: record.hashtags,
            view_count: record.view_count,
            like_count: record.like_count,
            comment_count: record.comment_count,
            video_url: record.video_url,
            author: record.author,
            timestamp: record.timestamp,
            transcript: String::new(),
            success: true,
            error: None,
            transcription_error: None,
            source: Some(source.to_string()),
        }
    }
}

fn finalize_transcript(text: String) -> String {
    if text.trim().is_empty() {
        NO_SPEECH.to_string()
    } else {
        text
    }
}

async fn remove_quietly(path: &Path, what: &str) {
    match fs_err::tokio::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed {}", what),
        Err(e) => warn!(error = %e, "Could not delete {}", what),
    }
}

/// Sequences extraction and transcription for each input URL
pub struct ReelPipeline {
    orchestrator: ExtractionOrchestrator,
    downloader: MediaDownloader,
    audio: AudioExtractor,
    transcriber: Option<TranscriptionClient>,
    keep_audio: bool,
    _scratch: Option<TempDir>,
}

impl ReelPipeline {
    pub fn new(
        orchestrator: ExtractionOrchestrator,
        downloader: MediaDownloader,
        audio: AudioExtractor,
        transcriber: Option<TranscriptionClient>,
    ) -> Self {
        Self {
            orchestrator,
            downloader,
            audio,
            transcriber,
            keep_audio: false,
            _scratch: None,
        }
    }

    pub fn with_keep_audio(mut self, keep_audio: bool) -> Self {
        self.keep_audio = keep_audio;
        self
    }

    /// Build the full pipeline, failing fast on configuration errors
    pub fn from_config(
        config: &Config,
        include_transcript: bool,
        show_progress: bool,
    ) -> Result<Self, ReelError> {
        config.validate(include_transcript)?;

        let (work_dir, scratch) = match &config.media.work_dir {
            Some(dir) => (dir.clone(), None),
            None if config.media.keep_audio => (std::env::temp_dir().join("reelscribe"), None),
            None => {
                let scratch = TempDir::new()
                    .map_err(|e| ReelError::Config(format!("no scratch directory: {}", e)))?;
                (scratch.path().to_path_buf(), Some(scratch))
            }
        };
        debug!(work_dir = %work_dir.display(), "Media work directory");

        let transcriber = if include_transcript {
            let client = TranscriptionClient::from_config(config, show_progress)
                .map_err(|e| ReelError::Config(e.to_string()))?;
            Some(client)
        } else {
            None
        };

        let downloader =
            MediaDownloader::from_config(config, work_dir)?.with_progress(show_progress);
        let mut pipeline = Self::new(
            ExtractionOrchestrator::from_config(config),
            downloader,
            AudioExtractor::from_settings(&config.media),
            transcriber,
        )
        .with_keep_audio(config.media.keep_audio);
        pipeline._scratch = scratch;

        Ok(pipeline)
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.orchestrator.strategy_names()
    }

    /// Process every URL in order; one record per URL, never aborting the batch
    pub async fn run(&self, input: &PipelineInput) -> Result<Vec<OutputRecord>, ReelError> {
        input.validate()?;

        let mut records = Vec::with_capacity(input.reel_urls.len());
        for (index, url) in input.reel_urls.iter().enumerate() {
            info!(index, total = input.reel_urls.len(), url = %url, "Processing reel");
            records.push(self.process(index, url, input.include_transcript).await);
        }

        Ok(records)
    }

    /// Run one URL through the pipeline
    pub async fn process(&self, index: usize, url: &str, include_transcript: bool) -> OutputRecord {
        if !validate_reel_url(url) {
            let error = ReelError::InvalidUrl(url.to_string());
            warn!(url = %url, "Skipping invalid reel URL");
            return OutputRecord::failed(url, &error);
        }

        let canonical = canonicalize_url(url);
        let outcome = match self.orchestrator.extract(&canonical).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(url = %canonical, error = %e, "Extraction failed");
                return OutputRecord::failed(&canonical, &e);
            }
        };

        for attempt in &outcome.attempts {
            debug!(
                strategy = %attempt.strategy,
                succeeded = attempt.succeeded,
                reason = attempt.failure_reason.as_deref().unwrap_or(""),
                "Extraction attempt"
            );
        }

        let mut output = OutputRecord::extracted(outcome.record, &outcome.strategy);
        info!(
            url = %output.url,
            source = %outcome.strategy,
            has_video = !output.video_url.is_empty(),
            "Reel data extracted"
        );

        match &self.transcriber {
            Some(transcriber) if include_transcript && !output.video_url.is_empty() => {
                match self.transcribe_video(transcriber, index, &output.video_url).await {
                    Ok(text) => output.transcript = finalize_transcript(text),
                    Err(e) => {
                        warn!(url = %output.url, error = %e, "Transcription failed");
                        output.transcript = String::new();
                        output.transcription_error = Some(e.to_string());
                    }
                }
            }
            _ => output.transcript = String::new(),
        }

        output
    }

    async fn transcribe_video(
        &self,
        transcriber: &TranscriptionClient,
        index: usize,
        video_url: &str,
    ) -> Result<String, ReelError> {
        let stem = run_identifier(index);
        let video_path = self.downloader.download(video_url, &stem).await?;

        let audio_path: PathBuf = match self.audio.extract(&video_path).await {
            Ok(path) => path,
            Err(e) => {
                remove_quietly(&video_path, "video file").await;
                return Err(e);
            }
        };

        let result = transcriber.transcribe(&audio_path).await.map_err(ReelError::from);

        if self.keep_audio {
            info!(audio = %audio_path.display(), "Keeping extracted audio");
        } else {
            remove_quietly(&audio_path, "audio file").await;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::orchestrator::tests::FixedStrategy;
    use crate::extractors::StrategyError;
    use crate::transcribe::{TranscriptionBackend, TranscriptionError};
    use async_trait::async_trait;
    use std::time::Duration;

    const GOOD: &str = "https://www.instagram.com/reel/GOOD123/?igsh=abc";

    struct Silent;

    #[async_trait]
    impl TranscriptionBackend for Silent {
        fn name(&self) -> &'static str {
            "silent"
        }

        async fn transcribe(&self, _audio_path: &Path) -> Result<String, TranscriptionError> {
            Ok(String::new())
        }
    }

    fn pipeline(
        dir: &Path,
        strategy: FixedStrategy,
        transcriber: Option<TranscriptionClient>,
    ) -> ReelPipeline {
        let mut orchestrator = ExtractionOrchestrator::new(Duration::from_secs(5));
        orchestrator.register(Box::new(strategy));
        let downloader =
            MediaDownloader::new(dir.to_path_buf(), "test-agent", Duration::from_secs(5)).unwrap();
        ReelPipeline::new(
            orchestrator,
            downloader,
            AudioExtractor::new("reelscribe-no-such-ffmpeg"),
            transcriber,
        )
    }

    fn captioned(video_url: &str) -> ContentRecord {
        let mut record = ContentRecord::new("https://www.instagram.com/reel/GOOD123/")
            .with_caption("Sunset run #fitness");
        record.video_url = video_url.to_string();
        record.author.username = "runner".to_string();
        record.like_count = 12;
        record
    }

    #[test]
    fn test_input_defaults_to_transcription() {
        let input =
            PipelineInput::from_json(r#"{"reelUrls": ["https://www.instagram.com/reel/A/"]}"#)
                .unwrap();
        assert!(input.include_transcript);

        let input = PipelineInput::from_json(
            r#"{"reelUrls": ["https://www.instagram.com/reel/A/"], "includeTranscript": false}"#,
        )
        .unwrap();
        assert!(!input.include_transcript);
    }

    #[test]
    fn test_input_requires_non_empty_url_array() {
        assert!(matches!(
            PipelineInput::from_json(r#"{"reelUrls": []}"#),
            Err(ReelError::InvalidInput(_))
        ));
        assert!(matches!(
            PipelineInput::from_json(r#"{"reelUrls": "https://www.instagram.com/reel/A/"}"#),
            Err(ReelError::InvalidInput(_))
        ));
        assert!(matches!(PipelineInput::from_json("{}"), Err(ReelError::InvalidInput(_))));
        assert!(matches!(PipelineInput::from_json("not json"), Err(ReelError::InvalidInput(_))));
    }

    #[test]
    fn test_non_string_urls_become_entries() {
        let input = PipelineInput::from_json(r#"{"reelUrls": [42]}"#).unwrap();
        assert_eq!(input.reel_urls, vec!["42".to_string()]);
    }

    #[test]
    fn test_empty_transcript_becomes_no_speech() {
        assert_eq!(finalize_transcript("  ".to_string()), NO_SPEECH);
        assert_eq!(finalize_transcript("words".to_string()), "words");
    }

    #[tokio::test]
    async fn test_batch_continues_past_invalid_url() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = FixedStrategy::new("remote_api", Ok(captioned("")));
        let calls = strategy.calls.clone();
        let pipeline = pipeline(dir.path(), strategy, None);
        let input = PipelineInput::new(
            vec!["https://instagram.com/p/NOTAREEL".to_string(), GOOD.to_string()],
            false,
        );

        let records = pipeline.run(&input).await.unwrap();

        assert_eq!(records.len(), 2);
        assert!(!records[0].success);
        assert!(records[0].error.as_deref().unwrap().contains("Invalid Instagram Reel URL"));
        assert_eq!(records[0].caption, "");

        assert!(records[1].success);
        assert_eq!(records[1].caption, "Sunset run #fitness");
        assert_eq!(records[1].hashtags, vec!["#fitness".to_string()]);
        assert_eq!(records[1].source.as_deref(), Some("remote_api"));
        assert_eq!(records[1].transcript, "");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_extraction_failure_yields_failed_record() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = FixedStrategy::new("browser", Err(StrategyError::Blocked));
        let pipeline = pipeline(dir.path(), strategy, None);

        let record = pipeline.process(0, GOOD, false).await;

        assert!(!record.success);
        assert_eq!(record.url, "https://www.instagram.com/reel/GOOD123/");
        assert!(record.error.unwrap().contains("Failed to extract reel data"));
        assert_eq!(record.view_count, 0);
    }

    #[tokio::test]
    async fn test_transcription_failure_keeps_extracted_fields() {
        let mut server = mockito::Server::new_async().await;
        let _video = server
            .mock("GET", "/v.mp4")
            .with_status(200)
            .with_body(vec![0u8; 256])
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let video_url = format!("{}/v.mp4", server.url());
        let pipeline = pipeline(
            dir.path(),
            FixedStrategy::new("remote_api", Ok(captioned(&video_url))),
            Some(TranscriptionClient::new(Box::new(Silent))),
        );

        let record = pipeline.process(3, GOOD, true).await;

        assert!(record.success);
        assert_eq!(record.video_url, video_url);
        assert_eq!(record.like_count, 12);
        assert_eq!(record.transcript, "");
        assert!(record.transcription_error.unwrap().contains("not installed"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    async fn transcribed(keep_audio: bool) -> (OutputRecord, tempfile::TempDir) {
        let mut server = mockito::Server::new_async().await;
        let _video = server
            .mock("GET", "/v.mp4")
            .with_status(200)
            .with_body(vec![0u8; 256])
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let tools = tempfile::tempdir().unwrap();
        let video_url = format!("{}/v.mp4", server.url());
        let mut pipeline = pipeline(
            dir.path(),
            FixedStrategy::new("remote_api", Ok(captioned(&video_url))),
            Some(TranscriptionClient::new(Box::new(Silent))),
        )
        .with_keep_audio(keep_audio);
        pipeline.audio = AudioExtractor::new(crate::media::audio::tests::fake_ffmpeg(tools.path()));

        let record = pipeline.process(1, GOOD, true).await;
        (record, dir)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_silent_audio_reports_no_speech() {
        let (record, dir) = transcribed(false).await;

        assert!(record.success);
        assert_eq!(record.transcript, NO_SPEECH);
        assert!(record.transcription_error.is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_keep_audio_leaves_mp3_in_work_dir() {
        let (record, dir) = transcribed(true).await;

        assert_eq!(record.transcript, NO_SPEECH);
        let files: Vec<PathBuf> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].extension().and_then(|e| e.to_str()), Some("mp3"));
    }

    #[tokio::test]
    async fn test_download_failure_is_transcription_error() {
        let mut server = mockito::Server::new_async().await;
        let _video = server.mock("GET", "/gone.mp4").with_status(404).create_async().await;

        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(
            dir.path(),
            FixedStrategy::new(
                "remote_api",
                Ok(captioned(&format!("{}/gone.mp4", server.url()))),
            ),
            Some(TranscriptionClient::new(Box::new(Silent))),
        );

        let record = pipeline.process(0, GOOD, true).await;

        assert!(record.success);
        assert!(record.transcription_error.unwrap().contains("Failed to download video"));
    }

    #[test]
    fn test_output_record_field_names() {
        let record = OutputRecord::extracted(captioned("https://cdn/v.mp4"), "browser");
        let json = serde_json::to_value(&record).unwrap();
        let keys = [
            "url",
            "caption",
            "hashtags",
            "viewCount",
            "likeCount",
            "commentCount",
            "videoUrl",
            "author",
            "timestamp",
            "transcript",
            "success",
            "source",
        ];
        for key in keys {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(json["author"]["fullName"], "");
        assert!(json.get("error").is_none());
    }
}
