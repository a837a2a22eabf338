//! Chromium renderer over CDP.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::{Browser as CdpBrowser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{Browser, Renderer};
use crate::config::Settings;
use crate::error::{Result, ScrapeError};

const EXTENT_SCRIPT: &str = "document.body.scrollHeight";

pub struct ChromeBrowser {
    browser: Mutex<CdpBrowser>,
    user_agent: String,
    accept_language: String,
}

impl ChromeBrowser {
    pub async fn launch(settings: &Settings) -> Result<Self> {
        info!(headless = settings.headless, "launching chromium");

        let (width, height) = settings.viewport;
        let mut builder = BrowserConfig::builder()
            .window_size(width, height)
            .arg(format!("--lang={}", settings.locale))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-sandbox");
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(ScrapeError::Render)?;

        let (browser, mut handler) = CdpBrowser::launch(config)
            .await
            .map_err(|e| ScrapeError::Render(format!("failed to launch browser: {}", e)))?;

        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser: Mutex::new(browser),
            user_agent: settings.user_agent.clone(),
            accept_language: settings.accept_language.clone(),
        })
    }

    pub async fn shutdown(self) {
        let mut browser = self.browser.into_inner();
        if let Err(e) = browser.close().await {
            warn!("browser did not close cleanly: {}", e);
        }
    }
}

#[async_trait]
impl Browser for ChromeBrowser {
    async fn open_page(&self) -> Result<Box<dyn Renderer>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(|e| ScrapeError::Render(format!("failed to open page: {}", e)))?;

        let ua = SetUserAgentOverrideParams::builder()
            .user_agent(self.user_agent.clone())
            .accept_language(self.accept_language.clone())
            .build()
            .map_err(ScrapeError::Render)?;
        page.execute(ua)
            .await
            .map_err(|e| ScrapeError::Render(format!("failed to set user agent: {}", e)))?;

        Ok(Box::new(ChromePage {
            page,
            url: String::new(),
        }))
    }
}

pub struct ChromePage {
    page: Page,
    url: String,
}

#[async_trait]
impl Renderer for ChromePage {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
        let nav_err = |reason: String| ScrapeError::Navigation {
            url: url.to_string(),
            reason,
        };
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {
                self.url = url.to_string();
                debug!(url, "page loaded");
                Ok(())
            }
            Ok(Err(e)) => Err(nav_err(e.to_string())),
            Err(_) => Err(nav_err(format!("timed out after {}s", timeout.as_secs()))),
        }
    }

    async fn wait_ready(&mut self, selector: &str, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ScrapeError::ReadyTimeout {
                    url: self.url.clone(),
                    selector: selector.to_string(),
                    timeout_secs: timeout.as_secs(),
                });
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn current_html(&mut self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| ScrapeError::Render(format!("failed to read content of {}: {}", self.url, e)))
    }

    async fn scroll_by(&mut self, dx: i64, dy: i64) -> Result<()> {
        self.page
            .evaluate(format!("window.scrollBy({}, {})", dx, dy))
            .await
            .map(|_| ())
            .map_err(|e| ScrapeError::Render(format!("scroll failed: {}", e)))
    }

    async fn measure_extent(&mut self) -> Result<f64> {
        let result = self
            .page
            .evaluate(EXTENT_SCRIPT)
            .await
            .map_err(|e| ScrapeError::ExtentMeasurement(e.to_string()))?;
        result
            .into_value::<f64>()
            .map_err(|e| ScrapeError::ExtentMeasurement(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.page.clone().close().await {
            debug!(url = %self.url, "page close failed: {}", e);
        }
    }
}
