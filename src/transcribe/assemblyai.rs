use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;

use super::processor::{
    JobStatus, PollPolicy, Sleeper, TokioSleeper, TranscriptJobApi, TranscriptionJob,
};
use super::{TranscriptionBackend, TranscriptionError};
use crate::config::AssemblyAiSettings;

const SERVICE: &str = "AssemblyAI";

#[derive(Deserialize)]
struct UploadResponse {
    upload_url: String,
}

#[derive(Deserialize)]
struct SubmitResponse {
    id: String,
}

/// HTTP client for the AssemblyAI v2 upload/transcript endpoints
pub struct AssemblyAiApi {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AssemblyAiApi {
    pub fn new(api_key: String, settings: &AssemblyAiSettings) -> Result<Self, TranscriptionError> {
        let client = Client::builder().timeout(settings.request_timeout()).build()?;

        Ok(Self {
            client,
            api_key,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn checked(response: Response) -> Result<Response, TranscriptionError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        Err(TranscriptionError::Api {
            service: SERVICE,
            status,
            body,
        })
    }
}

#[async_trait]
impl TranscriptJobApi for AssemblyAiApi {
    async fn upload(&self, audio: Vec<u8>) -> Result<String, TranscriptionError> {
        let response = self
            .client
            .post(format!("{}/upload", self.base_url))
            .header("authorization", &self.api_key)
            .header("content-type", "application/octet-stream")
            .body(audio)
            .send()
            .await?;

        let upload: UploadResponse = Self::checked(response).await?.json().await?;
        Ok(upload.upload_url)
    }

    async fn submit(&self, upload_url: &str, language: &str) -> Result<String, TranscriptionError> {
        let response = self
            .client
            .post(format!("{}/transcript", self.base_url))
            .header("authorization", &self.api_key)
            .json(&json!({
                "audio_url": upload_url,
                "language_code": language,
            }))
            .send()
            .await?;

        let submitted: SubmitResponse = Self::checked(response).await?.json().await?;
        Ok(submitted.id)
    }

    async fn poll(&self, job_id: &str) -> Result<JobStatus, TranscriptionError> {
        let response = self
            .client
            .get(format!("{}/transcript/{}", self.base_url, job_id))
            .header("authorization", &self.api_key)
            .send()
            .await?;

        Ok(Self::checked(response).await?.json().await?)
    }
}

/// Asynchronous backend: upload, submit, then poll until the job settles
pub struct AssemblyAiBackend<A: TranscriptJobApi = AssemblyAiApi> {
    api: A,
    language: String,
    policy: PollPolicy,
    sleeper: Box<dyn Sleeper>,
    show_progress: bool,
}

impl<A: TranscriptJobApi> AssemblyAiBackend<A> {
    pub fn new(api: A, language: &str, policy: PollPolicy) -> Self {
        Self {
            api,
            language: language.to_string(),
            policy,
            sleeper: Box::new(TokioSleeper),
            show_progress: false,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    fn progress(&self) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let progress = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            progress.set_style(style);
        }
        progress.enable_steady_tick(std::time::Duration::from_millis(120));
        progress.set_message("Starting transcription job...");
        progress
    }
}

#[async_trait]
impl<A: TranscriptJobApi> TranscriptionBackend for AssemblyAiBackend<A> {
    fn name(&self) -> &'static str {
        "assemblyai"
    }

    async fn transcribe(&self, audio_path: &Path) -> Result<String, TranscriptionError> {
        let mut job = TranscriptionJob::new(audio_path.to_path_buf(), self.name());
        let progress = self.progress();

        job.run(&self.api, self.sleeper.as_ref(), self.policy, &self.language, &progress)
            .await
    }
}
