use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub mod chrome;
pub mod fields;

use self::fields::{recover_record, PageSnapshot};
use super::{ContentRecord, ExtractionStrategy, StrategyError};
use crate::config::{BrowserSettings, Config};
use crate::utils::{reel_shortcode, run_identifier, sanitize_filename};

/// Clicks the first visible close button of a login dialog; resolves to whether one was clicked
const DISMISS_INTERSTITIAL_SCRIPT: &str = r#"(() => {
    const selectors = [
        'button[aria-label="Close"]',
        'svg[aria-label="Close"]',
        'div[role="dialog"] button',
        'div[role="dialog"] svg',
    ];
    for (const selector of selectors) {
        for (const el of document.querySelectorAll(selector)) {
            const rect = el.getBoundingClientRect();
            if (rect.width > 0 && rect.height > 0) {
                const target = el.closest('button') || el.closest('[role="button"]') || el;
                target.click();
                return true;
            }
        }
    }
    return false;
})()"#;

const VIDEO_READY_SCRIPT: &str = r#"(() => {
    const video = document.querySelector('video');
    if (!video) return false;
    if (video.getAttribute('src')) return true;
    const source = video.querySelector('source[src]');
    return !!source;
})()"#;

const VIDEO_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Browsing context settings applied to every session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextOptions {
    pub proxy: Option<String>,
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub locale: String,
}

/// A launched headless browser able to open isolated sessions
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    async fn new_session(
        &self,
        options: &ContextOptions,
    ) -> Result<Box<dyn BrowserSession>, StrategyError>;
}

/// One isolated browsing context with a single page
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate and wait for the DOM to be ready
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<(), StrategyError>;

    /// Evaluate an expression in the page and return its JSON value
    async fn evaluate(&mut self, script: &str) -> Result<Value, StrategyError>;

    /// Serialized DOM of the current page
    async fn content(&mut self) -> Result<String, StrategyError>;

    /// URL the page ended up on after redirects
    async fn current_url(&mut self) -> Result<Option<String>, StrategyError>;

    async fn screenshot(&mut self, path: &Path) -> Result<(), StrategyError>;

    /// Release page, context and browser
    async fn close(self: Box<Self>) -> Result<(), StrategyError>;
}

/// Settle times between the rendering steps
#[derive(Debug, Clone, Copy)]
pub struct RenderWaits {
    pub navigation_timeout: Duration,
    pub initial_render: Duration,
    pub after_dismiss: Duration,
    pub settle: Duration,
    pub video: Duration,
}

impl RenderWaits {
    pub fn from_settings(settings: &BrowserSettings) -> Self {
        Self {
            navigation_timeout: Duration::from_secs(settings.navigation_timeout_secs),
            initial_render: Duration::from_secs(settings.render_wait_secs),
            after_dismiss: Duration::from_secs(settings.dismiss_wait_secs),
            settle: Duration::from_secs(settings.settle_wait_secs),
            video: Duration::from_secs(settings.video_wait_secs),
        }
    }

    /// No waiting at all, for pages served from fixtures
    pub fn immediate() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(5),
            initial_render: Duration::ZERO,
            after_dismiss: Duration::ZERO,
            settle: Duration::ZERO,
            video: Duration::ZERO,
        }
    }
}

/// Headless-browser DOM scraping strategy
pub struct BrowserStrategy {
    engine: Box<dyn BrowserEngine>,
    options: ContextOptions,
    waits: RenderWaits,
    screenshot_dir: Option<PathBuf>,
}

impl BrowserStrategy {
    pub fn new(
        engine: Box<dyn BrowserEngine>,
        options: ContextOptions,
        waits: RenderWaits,
    ) -> Self {
        Self {
            engine,
            options,
            waits,
            screenshot_dir: None,
        }
    }

    pub fn from_config(engine: impl BrowserEngine + 'static, config: &Config) -> Self {
        let settings = &config.extraction.browser;
        let options = ContextOptions {
            proxy: config.proxy.server_url(),
            user_agent: config.extraction.user_agent.clone(),
            viewport: (settings.viewport_width, settings.viewport_height),
            locale: settings.locale.clone(),
        };

        let waits = RenderWaits::from_settings(settings);
        let mut strategy = Self::new(Box::new(engine), options, waits);
        strategy.screenshot_dir = settings.screenshot_dir.clone();
        strategy
    }

    async fn render_and_extract(
        &self,
        session: &mut dyn BrowserSession,
        url: &str,
    ) -> Result<ContentRecord, StrategyError> {
        info!(url = %url, "Navigating to reel page");
        session.goto(url, self.waits.navigation_timeout).await?;
        sleep(self.waits.initial_render).await;

        match session.evaluate(DISMISS_INTERSTITIAL_SCRIPT).await {
            Ok(Value::Bool(true)) => {
                info!("Closed login popup");
                sleep(self.waits.after_dismiss).await;
            }
            Ok(_) => debug!("No visible login popup found"),
            Err(e) => debug!(error = %e, "Error checking for popup"),
        }

        sleep(self.waits.settle).await;

        if self.wait_for_video(session).await {
            debug!("Video element exposes a source");
        } else {
            warn!("Video element did not load src in time");
        }

        let html = session.content().await?;
        let location = session
            .current_url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| url.to_string());
        log_page_diagnostics(&html, &location);

        if let Some(dir) = &self.screenshot_dir {
            let name = reel_shortcode(url)
                .map(|code| sanitize_filename(&code))
                .unwrap_or_else(|| run_identifier(0));
            let path = dir.join(format!("{}.png", name));
            match session.screenshot(&path).await {
                Ok(()) => debug!(path = %path.display(), "Screenshot saved"),
                Err(e) => debug!(error = %e, "Could not save screenshot"),
            }
        }

        let snapshot = PageSnapshot::from_html(&html, &location);
        let record = recover_record(&snapshot, url);

        info!(
            caption = record.has_caption(),
            video = record.has_video(),
            views = record.view_count,
            likes = record.like_count,
            comments = record.comment_count,
            author = %record.author.username,
            hashtags = record.hashtags.len(),
            "Browser extraction results"
        );

        if record.is_blank() {
            return Err(StrategyError::Blocked);
        }
        Ok(record)
    }

    async fn wait_for_video(&self, session: &mut dyn BrowserSession) -> bool {
        let deadline = Instant::now() + self.waits.video;
        loop {
            if let Ok(Value::Bool(true)) = session.evaluate(VIDEO_READY_SCRIPT).await {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(VIDEO_POLL_INTERVAL).await;
        }
    }
}

fn log_page_diagnostics(html: &str, location: &str) {
    debug!(location = %location, length = html.len(), "Page loaded");

    if html.len() < 1000 {
        warn!(length = html.len(), "Page content is suspiciously short, Instagram may be blocking");
    }
    if html.contains("loginForm")
        || html.contains("Log in to Instagram")
        || html.contains("Login • Instagram")
    {
        warn!("Login wall detected, Instagram is requiring authentication");
    }
    if html.contains("not available") || html.contains("isn't available") {
        warn!("Content blocked, Instagram says content isn't available");
    }
}

#[async_trait]
impl ExtractionStrategy for BrowserStrategy {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn extract(&self, url: &str) -> Result<ContentRecord, StrategyError> {
        let mut guard = SessionGuard::new(self.engine.new_session(&self.options).await?);

        let result = match guard.session() {
            Some(session) => self.render_and_extract(session, url).await,
            None => Err(StrategyError::Browser("session already released".to_string())),
        };

        guard.close().await;
        result
    }
}

/// Owns an open session; if dropped before `close` (the extraction future was
/// cancelled), the session is closed on a background task instead.
struct SessionGuard {
    session: Option<Box<dyn BrowserSession>>,
}

impl SessionGuard {
    fn new(session: Box<dyn BrowserSession>) -> Self {
        Self {
            session: Some(session),
        }
    }

    fn session(&mut self) -> Option<&mut (dyn BrowserSession + 'static)> {
        self.session.as_deref_mut()
    }

    async fn close(mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!(error = %e, "Failed to close browser session");
            }
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Browser extraction cancelled, closing session in the background");
                handle.spawn(async move {
                    if let Err(e) = session.close().await {
                        warn!(error = %e, "Failed to close browser session");
                    }
                });
            }
            Err(_) => warn!("No runtime left to close an abandoned browser session"),
        }
    }
}
