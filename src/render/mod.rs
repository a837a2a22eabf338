//! Page renderers.
//!
//! The scraping loop only needs a handful of operations from a browser page:
//! navigate, wait for content, read the HTML, scroll, and measure how tall
//! the document has grown. [`Renderer`] is that surface; [`Browser`] hands
//! out fresh pages so listing pages and followed posts never share state.

#[cfg(feature = "browser")]
pub mod chrome;
pub mod http;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait Renderer: Send {
    /// Load `url`; fails with `Navigation` on timeout or network failure.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()>;

    /// Wait until `selector` matches; fails with `ReadyTimeout`.
    async fn wait_ready(&mut self, selector: &str, timeout: Duration) -> Result<()>;

    async fn current_html(&mut self) -> Result<String>;

    async fn scroll_by(&mut self, dx: i64, dy: i64) -> Result<()>;

    /// Total scrollable extent; fails with `ExtentMeasurement`.
    async fn measure_extent(&mut self) -> Result<f64>;

    /// Release the page; errors are ignored.
    async fn close(&mut self) {}
}

#[async_trait]
pub trait Browser: Send + Sync {
    async fn open_page(&self) -> Result<Box<dyn Renderer>>;
}

/// Navigate and, unless `selector` is empty, wait for it.
pub async fn open(
    page: &mut dyn Renderer,
    url: &str,
    selector: &str,
    nav_timeout: Duration,
    ready_timeout: Duration,
) -> Result<()> {
    page.navigate(url, nav_timeout).await?;
    if !selector.is_empty() {
        page.wait_ready(selector, ready_timeout).await?;
    }
    Ok(())
}
