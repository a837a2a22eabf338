//! Static renderer: a single GET per navigation, no script execution.
//!
//! Thread pages ship their data server-side, so this is enough for
//! single-post fetches. Scrolling does nothing and the extent is the
//! document length, so a pagination loop over it settles immediately.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, USER_AGENT};
use scraper::{Html, Selector};
use tracing::debug;

use super::{Browser, Renderer};
use crate::config::Settings;
use crate::error::{Result, ScrapeError};

pub struct HttpBrowser {
    client: reqwest::Client,
}

impl HttpBrowser {
    pub fn new(settings: &Settings) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let header = |v: &str| {
            HeaderValue::from_str(v).map_err(|e| ScrapeError::Config(format!("bad header {:?}: {}", v, e)))
        };
        headers.insert(USER_AGENT, header(&settings.user_agent)?);
        headers.insert(ACCEPT_LANGUAGE, header(&settings.accept_language)?);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ScrapeError::Config(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Browser for HttpBrowser {
    async fn open_page(&self) -> Result<Box<dyn Renderer>> {
        Ok(Box::new(HttpPage {
            client: self.client.clone(),
            url: String::new(),
            html: String::new(),
        }))
    }
}

pub struct HttpPage {
    client: reqwest::Client,
    url: String,
    html: String,
}

#[async_trait]
impl Renderer for HttpPage {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
        let nav_err = |reason: String| ScrapeError::Navigation {
            url: url.to_string(),
            reason,
        };
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| nav_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(nav_err(format!("HTTP {}", status)));
        }
        self.html = response.text().await.map_err(|e| nav_err(e.to_string()))?;
        self.url = url.to_string();
        debug!(url, bytes = self.html.len(), "fetched page");
        Ok(())
    }

    async fn wait_ready(&mut self, selector: &str, timeout: Duration) -> Result<()> {
        let sel = Selector::parse(selector)
            .map_err(|e| ScrapeError::Config(format!("bad selector {:?}: {}", selector, e)))?;
        let found = Html::parse_document(&self.html).select(&sel).next().is_some();
        if found {
            Ok(())
        } else {
            Err(ScrapeError::ReadyTimeout {
                url: self.url.clone(),
                selector: selector.to_string(),
                timeout_secs: timeout.as_secs(),
            })
        }
    }

    async fn current_html(&mut self) -> Result<String> {
        Ok(self.html.clone())
    }

    async fn scroll_by(&mut self, _dx: i64, _dy: i64) -> Result<()> {
        Ok(())
    }

    async fn measure_extent(&mut self) -> Result<f64> {
        Ok(self.html.len() as f64)
    }
}
