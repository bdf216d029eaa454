use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures_util::StreamExt;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{BrowserEngine, BrowserSession, ContextOptions};
use crate::config::BrowserSettings;
use crate::extractors::StrategyError;

fn browser_error(err: impl std::fmt::Display) -> StrategyError {
    StrategyError::Browser(err.to_string())
}

/// Chromium driven over the DevTools protocol.
///
/// Every session launches its own browser process, so contexts never share
/// cookies, cache or proxy settings between runs.
pub struct ChromeEngine {
    executable: Option<PathBuf>,
    headless: bool,
    no_sandbox: bool,
    launch_timeout: Duration,
}

impl ChromeEngine {
    pub fn from_config(settings: &BrowserSettings) -> Self {
        Self {
            executable: settings.executable.clone(),
            headless: settings.headless,
            no_sandbox: settings.no_sandbox,
            launch_timeout: Duration::from_secs(settings.navigation_timeout_secs),
        }
    }

    fn browser_config(&self, options: &ContextOptions) -> Result<BrowserConfig, StrategyError> {
        let (width, height) = options.viewport;
        let mut builder = BrowserConfig::builder()
            .window_size(width, height)
            .request_timeout(self.launch_timeout)
            .arg(format!("--user-agent={}", options.user_agent))
            .arg(format!("--lang={}", options.locale))
            .arg("--disable-blink-features=AutomationControlled");

        if let Some(proxy) = &options.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }
        if let Some(executable) = &self.executable {
            builder = builder.chrome_executable(executable);
        }
        if !self.headless {
            builder = builder.with_head();
        }
        if self.no_sandbox {
            builder = builder.no_sandbox();
        }

        builder.build().map_err(StrategyError::Browser)
    }
}

#[async_trait]
impl BrowserEngine for ChromeEngine {
    async fn new_session(
        &self,
        options: &ContextOptions,
    ) -> Result<Box<dyn BrowserSession>, StrategyError> {
        let config = self.browser_config(options)?;

        info!(proxy = options.proxy.is_some(), headless = self.headless, "Launching browser");
        let (mut browser, mut handler) = Browser::launch(config).await.map_err(browser_error)?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                handler_task.abort();
                return Err(browser_error(e));
            }
        };

        Ok(Box::new(ChromeSession {
            browser,
            page: Some(page),
            handler_task,
        }))
    }
}

struct ChromeSession {
    browser: Browser,
    page: Option<Page>,
    handler_task: JoinHandle<()>,
}

impl ChromeSession {
    fn page(&self) -> Result<&Page, StrategyError> {
        self.page
            .as_ref()
            .ok_or_else(|| StrategyError::Browser("page already closed".to_string()))
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<(), StrategyError> {
        let page = self.page()?;
        match tokio::time::timeout(timeout, page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(browser_error(e)),
            Err(_) => Err(StrategyError::TimedOut(timeout)),
        }
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value, StrategyError> {
        let result = self.page()?.evaluate(script).await.map_err(browser_error)?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn content(&mut self) -> Result<String, StrategyError> {
        self.page()?.content().await.map_err(browser_error)
    }

    async fn current_url(&mut self) -> Result<Option<String>, StrategyError> {
        self.page()?.url().await.map_err(browser_error)
    }

    async fn screenshot(&mut self, path: &Path) -> Result<(), StrategyError> {
        self.page()?
            .save_screenshot(ScreenshotParams::builder().build(), path)
            .await
            .map(|_| ())
            .map_err(browser_error)
    }

    async fn close(mut self: Box<Self>) -> Result<(), StrategyError> {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!(error = %e, "Page did not close cleanly");
            }
        }

        let closed = self.browser.close().await.map(|_| ()).map_err(browser_error);
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        closed
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}
