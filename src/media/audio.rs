use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::MediaSettings;
use crate::ReelError;

/// Demuxes video files into mono, constant-bitrate speech audio with ffmpeg
pub struct AudioExtractor {
    ffmpeg_path: String,
    sample_rate: u32,
    channels: u8,
    bitrate: String,
    timeout: Duration,
}

impl AudioExtractor {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            sample_rate: 16_000,
            channels: 1,
            bitrate: "96k".to_string(),
            timeout: Duration::from_secs(300),
        }
    }

    pub fn from_settings(settings: &MediaSettings) -> Self {
        Self {
            ffmpeg_path: settings.ffmpeg_path.clone(),
            sample_rate: settings.sample_rate,
            channels: settings.channels,
            bitrate: settings.audio_bitrate.clone(),
            timeout: settings.transcode_timeout(),
        }
    }

    /// Output path derived from the video path
    pub fn audio_path_for(video_path: &Path) -> PathBuf {
        video_path.with_extension("mp3")
    }

    fn arguments(&self, video_path: &Path, audio_path: &Path) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            video_path.to_string_lossy().into_owned(),
            "-vn".to_string(),
            "-ar".to_string(),
            self.sample_rate.to_string(),
            "-ac".to_string(),
            self.channels.to_string(),
            "-b:a".to_string(),
            self.bitrate.clone(),
            "-f".to_string(),
            "mp3".to_string(),
            "-y".to_string(),
            audio_path.to_string_lossy().into_owned(),
        ]
    }

    /// Extract the audio track of `video_path`, deleting the video on success
    pub async fn extract(&self, video_path: &Path) -> Result<PathBuf, ReelError> {
        let audio_path = Self::audio_path_for(video_path);
        info!(
            video = %video_path.display(),
            audio = %audio_path.display(),
            "Extracting audio from video"
        );

        let child = Command::new(&self.ffmpeg_path)
            .args(self.arguments(video_path, &audio_path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                    ReelError::ToolUnavailable(self.ffmpeg_path.clone())
                }
                _ => ReelError::AudioExtractionError(format!(
                    "could not start {}: {}",
                    self.ffmpeg_path, e
                )),
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(|e| ReelError::AudioExtractionError(e.to_string()))?,
            Err(_) => {
                return Err(ReelError::AudioExtractionError(format!(
                    "{} did not finish within {}s",
                    self.ffmpeg_path,
                    self.timeout.as_secs()
                )))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.lines().last().unwrap_or("no output").trim().to_string();
            return Err(ReelError::AudioExtractionError(format!(
                "{} exited with {}: {}",
                self.ffmpeg_path, output.status, detail
            )));
        }

        if !fs_err::tokio::metadata(&audio_path).await.is_ok_and(|m| m.is_file()) {
            return Err(ReelError::AudioExtractionError("file not created".to_string()));
        }

        info!(audio = %audio_path.display(), "Audio extracted");

        match fs_err::tokio::remove_file(video_path).await {
            Ok(()) => debug!(video = %video_path.display(), "Removed source video"),
            Err(e) => warn!(error = %e, "Could not delete video file"),
        }

        Ok(audio_path)
    }
}
