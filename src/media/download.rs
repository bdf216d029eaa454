use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::utils::sanitize_filename;
use crate::ReelError;

/// Streams remote video assets into a work directory
pub struct MediaDownloader {
    client: Client,
    work_dir: PathBuf,
    timeout: Duration,
    show_progress: bool,
}

impl MediaDownloader {
    pub fn new(work_dir: PathBuf, user_agent: &str, timeout: Duration) -> Result<Self, ReelError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| ReelError::DownloadError(format!("could not build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            work_dir,
            timeout,
            show_progress: false,
        })
    }

    pub fn from_config(config: &Config, work_dir: PathBuf) -> Result<Self, ReelError> {
        Self::new(work_dir, &config.extraction.user_agent, config.media.download_timeout())
    }

    /// Show a progress bar while downloading
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Download `video_url` to `<work_dir>/<file_stem>.mp4`.
    ///
    /// The body is written chunk by chunk; a partial file is removed on failure.
    pub async fn download(&self, video_url: &str, file_stem: &str) -> Result<PathBuf, ReelError> {
        fs_err::tokio::create_dir_all(&self.work_dir)
            .await
            .map_err(|e| ReelError::DownloadError(e.to_string()))?;

        let video_path = self.work_dir.join(format!("{}.mp4", sanitize_filename(file_stem)));
        info!(path = %video_path.display(), "Downloading video");

        let transfer = self.stream_to_file(video_url, &video_path);
        let result = match tokio::time::timeout(self.timeout, transfer).await {
            Ok(result) => result,
            Err(_) => Err(ReelError::DownloadError(format!(
                "timed out after {}s",
                self.timeout.as_secs()
            ))),
        };

        if let Err(e) = &result {
            warn!(error = %e, "Video download failed");
            if let Err(cleanup) = fs_err::tokio::remove_file(&video_path).await {
                debug!(error = %cleanup, "No partial download to remove");
            }
        }

        result.map(|bytes| {
            info!(path = %video_path.display(), bytes, "Video downloaded");
            video_path
        })
    }

    async fn stream_to_file(&self, video_url: &str, path: &Path) -> Result<u64, ReelError> {
        let response = self
            .client
            .get(video_url)
            .send()
            .await
            .map_err(|e| ReelError::DownloadError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ReelError::DownloadError(format!("HTTP {}", response.status())));
        }

        let progress = if self.show_progress {
            let bar = ProgressBar::new(response.content_length().unwrap_or(0));
            if let Ok(style) = ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
                )
            {
                bar.set_style(style);
            }
            bar.set_message("Downloading video...");
            bar
        } else {
            ProgressBar::hidden()
        };

        let mut file = fs_err::tokio::File::create(path)
            .await
            .map_err(|e| ReelError::DownloadError(e.to_string()))?;
        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ReelError::DownloadError(e.to_string()))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| ReelError::DownloadError(e.to_string()))?;
            downloaded += chunk.len() as u64;
            progress.set_position(downloaded);
        }

        file.flush()
            .await
            .map_err(|e| ReelError::DownloadError(e.to_string()))?;
        progress.finish_with_message("Download complete");

        Ok(downloaded)
    }
}
