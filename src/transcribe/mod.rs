//! Speech-to-text: one synchronous backend and one upload/submit/poll backend.

use async_trait::async_trait;
use std::path::Path;
use tracing::info;

use crate::config::{BackendPreference, Config};

pub mod assemblyai;
pub mod processor;
pub mod whisper;

pub use assemblyai::{AssemblyAiApi, AssemblyAiBackend};
pub use processor::{
    JobState, JobStatus, PollPolicy, Sleeper, TokioSleeper, TranscriptJobApi, TranscriptionJob,
};
pub use whisper::WhisperBackend;

#[derive(thiserror::Error, Debug)]
pub enum TranscriptionError {
    #[error("no API key configured for {0}")]
    MissingCredentials(&'static str),

    #[error("request failed: {0}")]
    Request(String),

    #[error("{service} returned HTTP {status}: {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{0}")]
    Failed(String),

    #[error("no result after {polls} polls")]
    TimedOut { polls: u32 },

    #[error("job cannot move from {from:?} to {to:?}")]
    InvalidTransition { from: JobState, to: JobState },

    #[error("could not read audio: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for TranscriptionError {
    fn from(err: reqwest::Error) -> Self {
        TranscriptionError::Request(err.to_string())
    }
}

/// A speech-to-text service
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn transcribe(&self, audio_path: &Path) -> Result<String, TranscriptionError>;
}

/// Which backend a run will use, given the preference and the keys at hand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Whisper,
    AssemblyAi,
}

pub fn select_backend(config: &Config) -> Result<BackendKind, TranscriptionError> {
    let credentials = &config.credentials;
    match config.transcription.backend {
        BackendPreference::Whisper if credentials.has_openai() => Ok(BackendKind::Whisper),
        BackendPreference::Whisper => Err(TranscriptionError::MissingCredentials("OpenAI Whisper")),
        BackendPreference::AssemblyAi if credentials.has_assemblyai() => {
            Ok(BackendKind::AssemblyAi)
        }
        BackendPreference::AssemblyAi => Err(TranscriptionError::MissingCredentials("AssemblyAI")),
        BackendPreference::Auto if credentials.has_openai() => Ok(BackendKind::Whisper),
        BackendPreference::Auto if credentials.has_assemblyai() => Ok(BackendKind::AssemblyAi),
        BackendPreference::Auto => Err(TranscriptionError::MissingCredentials(
            "any transcription backend",
        )),
    }
}

/// Transcribes local audio files through the configured backend
pub struct TranscriptionClient {
    backend: Box<dyn TranscriptionBackend>,
}

impl TranscriptionClient {
    pub fn new(backend: Box<dyn TranscriptionBackend>) -> Self {
        Self { backend }
    }

    pub fn from_config(config: &Config, show_progress: bool) -> Result<Self, TranscriptionError> {
        let settings = &config.transcription;
        let backend: Box<dyn TranscriptionBackend> = match select_backend(config)? {
            BackendKind::Whisper => Box::new(WhisperBackend::new(
                config.credentials.openai_api_key.clone().unwrap_or_default(),
                &settings.whisper,
                &settings.language,
            )?),
            BackendKind::AssemblyAi => {
                let api = AssemblyAiApi::new(
                    config.credentials.assemblyai_api_key.clone().unwrap_or_default(),
                    &settings.assemblyai,
                )?;
                let policy = PollPolicy::from_settings(&settings.assemblyai);
                Box::new(
                    AssemblyAiBackend::new(api, &settings.language, policy)
                        .with_progress(show_progress),
                )
            }
        };

        info!(backend = backend.name(), "Transcription backend selected");
        Ok(Self::new(backend))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Transcribe `audio_path`, returning the trimmed text
    pub async fn transcribe(&self, audio_path: &Path) -> Result<String, TranscriptionError> {
        info!(backend = self.backend.name(), audio = %audio_path.display(), "Transcribing audio");
        let started = std::time::Instant::now();

        let text = self.backend.transcribe(audio_path).await?;
        let text = text.trim().to_string();

        info!(
            backend = self.backend.name(),
            chars = text.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Transcription completed"
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;

    fn config(preference: BackendPreference, openai: bool, assemblyai: bool) -> Config {
        let mut config = Config::default().with_credentials(Credentials {
            rapidapi_key: None,
            openai_api_key: openai.then(|| "sk-test".to_string()),
            assemblyai_api_key: assemblyai.then(|| "aai-test".to_string()),
        });
        config.transcription.backend = preference;
        config
    }

    struct Echo(&'static str);

    #[async_trait]
    impl TranscriptionBackend for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn transcribe(&self, _audio_path: &Path) -> Result<String, TranscriptionError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_auto_prefers_whisper() {
        assert_eq!(
            select_backend(&config(BackendPreference::Auto, true, true)).unwrap(),
            BackendKind::Whisper
        );
        assert_eq!(
            select_backend(&config(BackendPreference::Auto, false, true)).unwrap(),
            BackendKind::AssemblyAi
        );
        assert!(matches!(
            select_backend(&config(BackendPreference::Auto, false, false)),
            Err(TranscriptionError::MissingCredentials(_))
        ));
    }

    #[test]
    fn test_explicit_preference_needs_its_key() {
        assert!(select_backend(&config(BackendPreference::Whisper, false, true)).is_err());
        assert!(select_backend(&config(BackendPreference::AssemblyAi, true, false)).is_err());
        assert_eq!(
            select_backend(&config(BackendPreference::AssemblyAi, true, true)).unwrap(),
            BackendKind::AssemblyAi
        );
    }

    #[test]
    fn test_client_from_config_names_backend() {
        let config = config(BackendPreference::Auto, false, true);
        let client = TranscriptionClient::from_config(&config, false).unwrap();
        assert_eq!(client.backend_name(), "assemblyai");
    }

    #[tokio::test]
    async fn test_transcript_is_trimmed() {
        let client = TranscriptionClient::new(Box::new(Echo("  hello there \n")));
        let text = client.transcribe(Path::new("/tmp/none.mp3")).await.unwrap();
        assert_eq!(text, "hello there");
    }

    #[test]
    fn test_timeout_maps_to_top_level_error() {
        let err: crate::ReelError = TranscriptionError::TimedOut { polls: 60 }.into();
        assert!(matches!(err, crate::ReelError::TranscriptionTimedOut(60)));
    }
}
