use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::ReelError;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Extraction strategies and their endpoints
    pub extraction: ExtractionSettings,

    /// Download and transcoding settings
    pub media: MediaSettings,

    /// Speech-to-text backend settings
    pub transcription: TranscriptionSettings,

    /// Outbound proxy for the browser strategy
    pub proxy: ProxySettings,

    /// Keys supplied from the command line or environment, never persisted
    #[serde(skip)]
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub rapidapi_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub assemblyai_api_key: Option<String>,
}

impl Credentials {
    fn present(key: &Option<String>) -> bool {
        key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    pub fn has_rapidapi(&self) -> bool {
        Self::present(&self.rapidapi_key)
    }

    pub fn has_openai(&self) -> bool {
        Self::present(&self.openai_api_key)
    }

    pub fn has_assemblyai(&self) -> bool {
        Self::present(&self.assemblyai_api_key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    /// User agent sent by every HTTP strategy and the browser
    pub user_agent: String,

    /// Upper bound for a single strategy invocation
    pub strategy_timeout_secs: u64,

    pub remote_api: RemoteApiSettings,
    pub browser: BrowserSettings,
    pub embed: EmbedSettings,
}

impl ExtractionSettings {
    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_secs(self.strategy_timeout_secs)
    }
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            strategy_timeout_secs: 180,
            remote_api: RemoteApiSettings::default(),
            browser: BrowserSettings::default(),
            embed: EmbedSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteApiSettings {
    pub enabled: bool,
    pub primary_url: String,
    pub secondary_url: String,
    pub timeout_secs: u64,
}

impl RemoteApiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RemoteApiSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            primary_url:
                "https://instagram-downloader-download-instagram-videos-stories.p.rapidapi.com/index"
                    .to_string(),
            secondary_url: "https://instagram-scraper-api2.p.rapidapi.com/v1/info".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub enabled: bool,
    pub headless: bool,

    /// Chromium binary; discovered on the system when unset
    pub executable: Option<PathBuf>,

    pub no_sandbox: bool,
    pub navigation_timeout_secs: u64,
    pub render_wait_secs: u64,
    pub dismiss_wait_secs: u64,
    pub settle_wait_secs: u64,
    pub video_wait_secs: u64,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub locale: String,

    /// Write a debug screenshot per run into this directory
    pub screenshot_dir: Option<PathBuf>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            headless: true,
            executable: None,
            no_sandbox: false,
            navigation_timeout_secs: 60,
            render_wait_secs: 15,
            dismiss_wait_secs: 3,
            settle_wait_secs: 5,
            video_wait_secs: 10,
            viewport_width: 1920,
            viewport_height: 1080,
            locale: "en-US".to_string(),
            screenshot_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedSettings {
    pub enabled: bool,
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl EmbedSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for EmbedSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://www.instagram.com/oembed/".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaSettings {
    /// Directory for downloaded videos and extracted audio (system temp dir if unset)
    pub work_dir: Option<PathBuf>,

    pub download_timeout_secs: u64,
    pub ffmpeg_path: String,
    pub sample_rate: u32,
    pub channels: u8,
    pub audio_bitrate: String,
    pub transcode_timeout_secs: u64,

    /// Keep audio files after transcription
    pub keep_audio: bool,
}

impl MediaSettings {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn transcode_timeout(&self) -> Duration {
        Duration::from_secs(self.transcode_timeout_secs)
    }
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            work_dir: None,
            download_timeout_secs: 120,
            ffmpeg_path: "ffmpeg".to_string(),
            sample_rate: 16_000,
            channels: 1,
            audio_bitrate: "96k".to_string(),
            transcode_timeout_secs: 300,
            keep_audio: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// Whisper when its key is present, otherwise AssemblyAI
    #[default]
    Auto,
    Whisper,
    AssemblyAi,
}

impl std::fmt::Display for BackendPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendPreference::Auto => write!(f, "auto"),
            BackendPreference::Whisper => write!(f, "whisper"),
            BackendPreference::AssemblyAi => write!(f, "assemblyai"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    pub backend: BackendPreference,
    pub language: String,
    pub whisper: WhisperSettings,
    pub assemblyai: AssemblyAiSettings,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            backend: BackendPreference::Auto,
            language: "en".to_string(),
            whisper: WhisperSettings::default(),
            assemblyai: AssemblyAiSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhisperSettings {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl WhisperSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for WhisperSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "whisper-1".to_string(),
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyAiSettings {
    pub base_url: String,
    pub poll_interval_secs: u64,
    pub max_polls: u32,
    pub request_timeout_secs: u64,
}

impl AssemblyAiSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for AssemblyAiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.assemblyai.com/v2".to_string(),
            poll_interval_secs: 5,
            max_polls: 60,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub enabled: bool,

    /// Proxy group selector passed to the provisioning layer
    pub groups: Vec<String>,

    /// Pre-provisioned proxy URL
    pub url: Option<String>,
}

impl ProxySettings {
    /// Proxy server to hand to the browser, if one is enabled and provisioned
    pub fn server_url(&self) -> Option<String> {
        if !self.enabled {
            return None;
        }
        self.url.clone().filter(|u| !u.trim().is_empty())
    }
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            groups: vec!["RESIDENTIAL".to_string()],
            url: None,
        }
    }
}

impl Config {
    /// Load configuration from `explicit`, `./config.yaml` or the user config dir.
    ///
    /// A missing file yields the defaults; an explicit path must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::config_path().ok().filter(|p| p.exists()),
        };

        match path {
            Some(path) => {
                let content = fs_err::read_to_string(&path).context("Failed to read config file")?;
                let config: Config =
                    serde_yaml::from_str(&content).context("Failed to parse config file")?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Save configuration to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;
        fs_err::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("reelscribe").join("config.yaml"))
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Check the settings a run depends on before any URL is touched
    pub fn validate(&self, include_transcript: bool) -> std::result::Result<(), ReelError> {
        let has_backend_key = self.credentials.has_openai() || self.credentials.has_assemblyai();
        if include_transcript && !has_backend_key {
            return Err(ReelError::Config(
                "either OPENAI_API_KEY or ASSEMBLYAI_API_KEY must be set when transcription is enabled"
                    .to_string(),
            ));
        }

        let timeouts = [
            ("extraction.strategy_timeout_secs", self.extraction.strategy_timeout_secs),
            ("extraction.remote_api.timeout_secs", self.extraction.remote_api.timeout_secs),
            ("extraction.embed.timeout_secs", self.extraction.embed.timeout_secs),
            (
                "extraction.browser.navigation_timeout_secs",
                self.extraction.browser.navigation_timeout_secs,
            ),
            ("media.download_timeout_secs", self.media.download_timeout_secs),
            ("media.transcode_timeout_secs", self.media.transcode_timeout_secs),
            ("transcription.whisper.timeout_secs", self.transcription.whisper.timeout_secs),
            (
                "transcription.assemblyai.request_timeout_secs",
                self.transcription.assemblyai.request_timeout_secs,
            ),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(ReelError::Config(format!("{} must be greater than zero", name)));
        }

        if self.transcription.assemblyai.max_polls == 0 {
            return Err(ReelError::Config(
                "transcription.assemblyai.max_polls must be greater than zero".to_string(),
            ));
        }

        if self.proxy.enabled && self.proxy.server_url().is_none() {
            warn!(
                groups = ?self.proxy.groups,
                "Proxy requested but no proxy URL provisioned, continuing without proxy"
            );
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        let flag = |present: bool| if present { "set" } else { "not set" };
        let toggle = |enabled: bool| if enabled { "enabled" } else { "disabled" };

        println!("Current Configuration:");
        println!("  Strategy timeout: {}s", self.extraction.strategy_timeout_secs);
        println!("  Remote API: {}", toggle(self.extraction.remote_api.enabled));
        println!("  Browser: {}", toggle(self.extraction.browser.enabled));
        println!("  Embed metadata: {}", toggle(self.extraction.embed.enabled));
        println!("  ffmpeg: {}", self.media.ffmpeg_path);
        println!("  Keep Audio: {}", self.media.keep_audio);
        println!("  Transcription backend: {}", self.transcription.backend);
        println!("  Transcription language: {}", self.transcription.language);
        println!(
            "  Proxy: {} (groups: {})",
            if self.proxy.enabled { "enabled" } else { "disabled" },
            self.proxy.groups.join(", ")
        );
        println!("  RAPIDAPI_KEY: {}", flag(self.credentials.has_rapidapi()));
        println!("  OPENAI_API_KEY: {}", flag(self.credentials.has_openai()));
        println!("  ASSEMBLYAI_API_KEY: {}", flag(self.credentials.has_assemblyai()));
    }
}
