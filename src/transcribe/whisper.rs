use async_trait::async_trait;
use reqwest::multipart;
use std::path::Path;

use super::{TranscriptionBackend, TranscriptionError};
use crate::config::WhisperSettings;

/// OpenAI Whisper: audio goes up in one multipart request, text comes back
pub struct WhisperBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    language: String,
}

impl WhisperBackend {
    pub fn new(
        api_key: String,
        settings: &WhisperSettings,
        language: &str,
    ) -> Result<Self, TranscriptionError> {
        let client = reqwest::Client::builder().timeout(settings.timeout()).build()?;

        Ok(Self {
            client,
            api_key,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            language: language.to_string(),
        })
    }
}

#[async_trait]
impl TranscriptionBackend for WhisperBackend {
    fn name(&self) -> &'static str {
        "whisper"
    }

    async fn transcribe(&self, audio_path: &Path) -> Result<String, TranscriptionError> {
        let url = format!("{}/audio/transcriptions", self.base_url);
        let audio = fs_err::tokio::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.mp3".to_string());

        let file_part = multipart::Part::bytes(audio)
            .file_name(file_name)
            .mime_str("audio/mpeg")
            .map_err(|e| TranscriptionError::Request(format!("mime: {}", e)))?;

        let form = multipart::Form::new()
            .text("model", self.model.clone())
            .text("language", self.language.clone())
            .text("response_format", "text")
            .part("file", file_part);

        tracing::debug!(model = %self.model, "Sending audio to OpenAI Whisper API");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(TranscriptionError::Api {
                service: "OpenAI Whisper",
                status,
                body,
            });
        }

        let transcript = response.text().await?;
        tracing::info!(chars = transcript.len(), "OpenAI Whisper transcription completed");

        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn backend(base_url: String) -> WhisperBackend {
        let settings = WhisperSettings {
            base_url,
            ..WhisperSettings::default()
        };
        WhisperBackend::new("sk-test".to_string(), &settings, "en").unwrap()
    }

    async fn audio_file(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("reel_0_abcd.mp3");
        tokio::fs::write(&path, b"ID3 fake mp3").await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_returns_plain_text_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/audio/transcriptions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::Regex("whisper-1".to_string()))
            .with_status(200)
            .with_body("Hello from the reel\n")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let audio = audio_file(dir.path()).await;
        let text = backend(server.url()).transcribe(&audio).await.unwrap();

        assert_eq!(text, "Hello from the reel\n");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_api_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/audio/transcriptions")
            .with_status(401)
            .with_body("invalid key")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let audio = audio_file(dir.path()).await;
        let result = backend(server.url()).transcribe(&audio).await;

        assert!(matches!(
            result,
            Err(TranscriptionError::Api { status: 401, ref body, .. }) if body == "invalid key"
        ));
    }

    #[tokio::test]
    async fn test_missing_audio_is_io_error() {
        let result = backend("http://127.0.0.1:9".to_string())
            .transcribe(Path::new("/nonexistent/reel.mp3"))
            .await;
        assert!(matches!(result, Err(TranscriptionError::Io(_))));
    }
}
