use std::time::Duration;

use indicatif::ProgressBar;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::dedup::SeenIds;
use crate::error::{Result, ScrapeError};
use crate::parser::{self, links::PostLink};
use crate::record::{PostRecord, RunTags, Thread};
use crate::render::{self, Browser, Renderer};

/// Why a pagination loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    CapReached,
    Stable,
    ExtentUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Running,
    StablePending,
    Done(StopReason),
}

/// Per-loop counters; created fresh for every keyword or URL.
#[derive(Debug, Default)]
pub struct PaginationState {
    pub collected_count: usize,
    pub last_measured_extent: f64,
    pub stable_round_count: u32,
}

impl PaginationState {
    /// Fold one extent reading in. `threshold` consecutive unchanged readings end the loop.
    pub fn observe_extent(&mut self, extent: f64, threshold: u32) -> PageState {
        if extent == self.last_measured_extent {
            self.stable_round_count += 1;
        } else {
            self.stable_round_count = 0;
            self.last_measured_extent = extent;
        }

        if self.stable_round_count >= threshold.max(1) {
            PageState::Done(StopReason::Stable)
        } else if self.stable_round_count > 0 {
            PageState::StablePending
        } else {
            PageState::Running
        }
    }
}

/// Everything one pagination loop produced.
#[derive(Debug)]
pub struct Harvest {
    pub records: Vec<PostRecord>,
    /// Threads deep-fetched from followed post links.
    pub threads: Vec<Thread>,
    pub stop: StopReason,
    pub rounds: u32,
    pub follow_errors: usize,
}

/// Scroll/extract/measure loop over one listing page.
pub struct Paginator<'a> {
    settings: &'a Settings,
    browser: &'a dyn Browser,
    limit: usize,
    tags: RunTags,
    listing_url: &'a str,
    collect_inline: bool,
    progress: ProgressBar,
}

struct Collected {
    records: Vec<PostRecord>,
    threads: Vec<Thread>,
    follow_errors: usize,
}

impl<'a> Paginator<'a> {
    pub fn new(settings: &'a Settings, browser: &'a dyn Browser, limit: usize, tags: RunTags) -> Self {
        Self {
            settings,
            browser,
            limit,
            tags,
            listing_url: "",
            collect_inline: true,
            progress: ProgressBar::hidden(),
        }
    }

    /// URL of the listing page, for log context.
    pub fn listing(mut self, url: &'a str) -> Self {
        self.listing_url = url;
        self
    }

    /// Collect only records of followed posts; the cap then counts those alone.
    pub fn threads_only(mut self) -> Self {
        self.collect_inline = false;
        self
    }

    /// Spinner updated once per round.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Drive `page` until the cap is hit, the extent stops growing, or the
    /// extent cannot be read. The page must already be navigated.
    pub async fn run(&self, page: &mut dyn Renderer, seen: &mut SeenIds) -> Harvest {
        let host = self.settings.host.as_str();
        let threshold = self.settings.stable_rounds.max(1);
        let mut state = PaginationState::default();
        let mut out = Collected {
            records: Vec::new(),
            threads: Vec::new(),
            follow_errors: 0,
        };
        let mut rounds = 0;

        let stop = loop {
            if out.records.len() >= self.limit {
                break StopReason::CapReached;
            }
            rounds += 1;

            match page.current_html().await {
                Ok(html) => {
                    let posts = if self.collect_inline {
                        parser::extract_posts(&html, self.listing_url, host)
                    } else {
                        Vec::new()
                    };
                    let links = if self.settings.follow_posts || !self.collect_inline {
                        parser::links::post_links(&html, host)
                    } else {
                        Vec::new()
                    };
                    drop(html);

                    if self.take_all(posts, seen, &mut out.records) {
                        break StopReason::CapReached;
                    }
                    if self.follow(links, seen, &mut out).await {
                        break StopReason::CapReached;
                    }
                }
                Err(e) => warn!(
                    keyword = %self.tags.keyword,
                    url = self.listing_url,
                    round = rounds,
                    "could not read page: {}",
                    e
                ),
            }
            state.collected_count = out.records.len();
            self.progress.set_message(format!(
                "{}: round {}, {} posts",
                self.tags.keyword, rounds, state.collected_count
            ));
            self.progress.tick();
            info!(
                keyword = %self.tags.keyword,
                round = rounds,
                collected = state.collected_count,
                "pagination round"
            );

            if let Err(e) = page.scroll_by(0, self.settings.scroll_step).await {
                warn!(keyword = %self.tags.keyword, "scroll failed: {}", e);
            }
            tokio::time::sleep(self.settings.scroll_delay()).await;

            let extent = match page.measure_extent().await {
                Ok(extent) => extent,
                Err(e) => {
                    warn!(keyword = %self.tags.keyword, url = self.listing_url, "stopping pagination: {}", e);
                    break StopReason::ExtentUnavailable;
                }
            };
            debug!(extent, last = state.last_measured_extent, "measured extent");
            match state.observe_extent(extent, threshold) {
                PageState::Done(reason) => break reason,
                other => debug!(state = ?other, stable = state.stable_round_count, "continuing"),
            }
        };

        info!(
            keyword = %self.tags.keyword,
            collected = out.records.len(),
            threads = out.threads.len(),
            rounds,
            stop = ?stop,
            "pagination finished"
        );
        Harvest {
            records: out.records,
            threads: out.threads,
            stop,
            rounds,
            follow_errors: out.follow_errors,
        }
    }

    /// Accept unseen records in order. Returns true once the cap is reached;
    /// the rest of the batch is dropped.
    fn take_all(
        &self,
        posts: impl IntoIterator<Item = PostRecord>,
        seen: &mut SeenIds,
        records: &mut Vec<PostRecord>,
    ) -> bool {
        for mut post in posts {
            if !seen.accept(&post) {
                continue;
            }
            post.tag(&self.tags);
            debug!(id = %post.id, url = %post.url, "accepted");
            records.push(post);
            if records.len() >= self.limit {
                info!(keyword = %self.tags.keyword, limit = self.limit, "limit reached");
                return true;
            }
        }
        false
    }

    /// Deep-fetch newly discovered post links. Returns true once the cap is reached.
    async fn follow(&self, links: Vec<PostLink>, seen: &mut SeenIds, out: &mut Collected) -> bool {
        let fresh: Vec<PostLink> = links
            .into_iter()
            .filter(|link| seen.visit_code(&link.code))
            .collect();
        if !fresh.is_empty() {
            debug!(count = fresh.len(), "following post links");
        }

        for link in fresh {
            let fetched = fetch_thread(self.browser, self.settings, &link.url, self.settings.post_timeout()).await;
            tokio::time::sleep(self.settings.post_delay()).await;

            let mut thread = match fetched {
                Ok(thread) => thread,
                Err(e) => {
                    warn!(url = %link.url, "post skipped: {}", e);
                    out.follow_errors += 1;
                    continue;
                }
            };
            thread.thread.tag(&self.tags);
            for reply in &mut thread.replies {
                reply.tag(&self.tags);
            }

            let capped = self.take_all(thread.records().cloned().collect::<Vec<_>>(), seen, &mut out.records);
            out.threads.push(thread);
            if capped {
                return true;
            }
        }
        false
    }
}

/// Open `url` in a fresh page and split its posts into root and replies.
pub async fn fetch_thread(
    browser: &dyn Browser,
    settings: &Settings,
    url: &str,
    timeout: Duration,
) -> Result<Thread> {
    let mut page = browser.open_page().await?;
    let result = fetch_thread_inner(page.as_mut(), settings, url, timeout).await;
    page.close().await;
    result
}

async fn fetch_thread_inner(
    page: &mut dyn Renderer,
    settings: &Settings,
    url: &str,
    timeout: Duration,
) -> Result<Thread> {
    render::open(page, url, &settings.ready_selector, timeout, settings.ready_timeout()).await?;
    let html = page.current_html().await?;
    let thread = parser::extract_thread(&html, url, &settings.host).ok_or_else(|| ScrapeError::NoThreadData {
        url: url.to_string(),
    })?;
    debug!(url, replies = thread.replies.len(), "fetched thread");
    Ok(thread)
}
