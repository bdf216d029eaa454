use async_trait::async_trait;
use indicatif::ProgressBar;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::TranscriptionError;
use crate::config::AssemblyAiSettings;

/// Status document returned by a job poll
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct JobStatus {
    pub status: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Remote side of an asynchronous transcription job
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptJobApi: Send + Sync {
    /// Upload raw audio bytes, returning an opaque handle for the job
    async fn upload(&self, audio: Vec<u8>) -> Result<String, TranscriptionError>;

    /// Submit a job for an uploaded handle, returning the job id
    async fn submit(&self, upload_url: &str, language: &str) -> Result<String, TranscriptionError>;

    async fn poll(&self, job_id: &str) -> Result<JobStatus, TranscriptionError>;
}

/// Waits between polls; injected so tests can run the loop without real time passing
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_polls: u32,
}

impl PollPolicy {
    pub fn from_settings(settings: &AssemblyAiSettings) -> Self {
        Self {
            interval: settings.poll_interval(),
            max_polls: settings.max_polls,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_polls: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Created,
    Uploading,
    Queued,
    Processing,
    Completed,
    Failed,
    TimedOut,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::TimedOut)
    }

    fn can_move_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Created, Uploading)
                | (Created, Failed)
                | (Uploading, Queued)
                | (Uploading, Failed)
                | (Queued, Queued | Processing | Completed | Failed | TimedOut)
                | (Processing, Processing | Completed | Failed | TimedOut)
        )
    }
}

/// One upload/submit/poll cycle for a single audio file
#[derive(Debug)]
pub struct TranscriptionJob {
    pub audio_location: PathBuf,
    pub backend: &'static str,
    state: JobState,
    job_id: Option<String>,
    result_text: Option<String>,
    poll_count: u32,
}

impl TranscriptionJob {
    pub fn new(audio_location: PathBuf, backend: &'static str) -> Self {
        Self {
            audio_location,
            backend,
            state: JobState::Created,
            job_id: None,
            result_text: None,
            poll_count: 0,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn poll_count(&self) -> u32 {
        self.poll_count
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    pub fn result_text(&self) -> Option<&str> {
        self.result_text.as_deref()
    }

    fn transition(&mut self, next: JobState) -> Result<(), TranscriptionError> {
        if !self.state.can_move_to(next) {
            return Err(TranscriptionError::InvalidTransition { from: self.state, to: next });
        }
        if self.state != next {
            debug!(
                backend = self.backend,
                from = ?self.state,
                to = ?next,
                "Transcription job state changed"
            );
        }
        self.state = next;
        Ok(())
    }

    /// Drive the job to a terminal state.
    ///
    /// Any error leaves the job in `Failed` unless it already reached another terminal state.
    pub async fn run(
        &mut self,
        api: &dyn TranscriptJobApi,
        sleeper: &dyn Sleeper,
        policy: PollPolicy,
        language: &str,
        progress: &ProgressBar,
    ) -> Result<String, TranscriptionError> {
        let result = self.drive(api, sleeper, policy, language, progress).await;

        if let Err(e) = &result {
            if !self.state.is_terminal() {
                self.state = JobState::Failed;
            }
            warn!(
                backend = self.backend,
                polls = self.poll_count,
                error = %e,
                "Transcription job did not complete"
            );
            progress.finish_with_message("Transcription failed");
        }

        result
    }

    async fn drive(
        &mut self,
        api: &dyn TranscriptJobApi,
        sleeper: &dyn Sleeper,
        policy: PollPolicy,
        language: &str,
        progress: &ProgressBar,
    ) -> Result<String, TranscriptionError> {
        self.transition(JobState::Uploading)?;
        progress.set_message("Uploading audio...");

        let audio = fs_err::tokio::read(&self.audio_location).await?;
        let upload_url = api.upload(audio).await?;
        debug!(backend = self.backend, "Audio uploaded");

        let job_id = api.submit(&upload_url, language).await?;
        self.job_id = Some(job_id.clone());
        self.transition(JobState::Queued)?;
        info!(backend = self.backend, job_id = %job_id, "Transcription job submitted");

        while self.poll_count < policy.max_polls {
            sleeper.sleep(policy.interval).await;
            self.poll_count += 1;

            let status = api.poll(&job_id).await?;
            debug!(
                backend = self.backend,
                poll = self.poll_count,
                status = %status.status,
                "Polled transcription job"
            );

            match status.status.as_str() {
                "completed" => {
                    self.transition(JobState::Completed)?;
                    let text = status.text.unwrap_or_default();
                    self.result_text = Some(text.clone());
                    progress.finish_with_message("Transcription completed!");
                    return Ok(text);
                }
                "error" => {
                    self.transition(JobState::Failed)?;
                    let reason = status.error.unwrap_or_else(|| "Unknown error".to_string());
                    return Err(TranscriptionError::Failed(reason));
                }
                "processing" => self.transition(JobState::Processing)?,
                _ => {}
            }

            progress.set_message(format!("Transcribing... (check #{})", self.poll_count));
        }

        self.transition(JobState::TimedOut)?;
        Err(TranscriptionError::TimedOut { polls: self.poll_count })
    }
}
