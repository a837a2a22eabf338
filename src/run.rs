use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::{error, info, warn};
use url::Url;

use crate::config::Settings;
use crate::dedup::{self, SeenIds};
use crate::record::{RunTags, Thread};
use crate::render::{self, Browser};
use crate::paginate::{self, Harvest, Paginator};
use crate::store::Store;

/// Batch stats returned after all keywords ran.
pub struct BatchStats {
    pub keywords: usize,
    pub ok: usize,
    pub errors: usize,
    pub records: usize,
}

fn listing_url(host: &str, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(&format!("https://{}/", host)).with_context(|| format!("bad host {:?}", host))?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("host {:?} cannot carry a path", host))?
        .clear()
        .extend(segments);
    Ok(url)
}

/// Tag listing for one keyword, e.g. `https://www.threads.net/tag/good%20vibes`.
pub fn tag_url(host: &str, keyword: &str) -> Result<Url> {
    listing_url(host, &["tag", keyword])
}

pub fn search_url(host: &str, phrase: &str) -> Result<Url> {
    let mut url = listing_url(host, &["search"])?;
    url.query_pairs_mut()
        .append_pair("q", phrase)
        .append_pair("serp_type", "default");
    Ok(url)
}

/// Open `url` in a fresh page and paginate it. The page is closed on every path.
async fn harvest(
    browser: &dyn Browser,
    settings: &Settings,
    url: &Url,
    paginator: Paginator<'_>,
    seen: &mut SeenIds,
) -> Result<Harvest> {
    let mut page = browser.open_page().await?;
    let opened = render::open(
        page.as_mut(),
        url.as_str(),
        &settings.ready_selector,
        settings.navigation_timeout(),
        settings.ready_timeout(),
    )
    .await;
    if let Err(e) = opened {
        page.close().await;
        return Err(e.into());
    }

    let harvest = paginator.run(page.as_mut(), seen).await;
    page.close().await;
    Ok(harvest)
}

async fn run_keyword(
    browser: &dyn Browser,
    settings: &Settings,
    store: &Store,
    category: &str,
    keyword: &str,
    limit: usize,
    spinner: ProgressBar,
) -> Result<usize> {
    let url = tag_url(&settings.host, keyword)?;
    let mut seen = dedup::load_seen(store, keyword);
    let tags = RunTags {
        keyword: keyword.to_string(),
        category: category.to_string(),
        language_context: settings.language_context.clone(),
    };

    info!(keyword, category, url = %url, "collecting");
    let paginator = Paginator::new(settings, browser, limit, tags)
        .listing(url.as_str())
        .with_progress(spinner);
    let harvest = harvest(browser, settings, &url, paginator, &mut seen)
        .await
        .with_context(|| format!("could not open {}", url))?;
    info!(
        keyword,
        stop = ?harvest.stop,
        rounds = harvest.rounds,
        followed = harvest.threads.len(),
        "keyword done"
    );

    store
        .persist(keyword, &harvest.records)
        .with_context(|| format!("could not save batch for {:?}", keyword))?;
    Ok(harvest.records.len())
}

/// Every keyword of the taxonomy (or one category) in order, one CSV each.
/// A failing keyword is logged and skipped.
pub async fn run_batch(
    browser: &dyn Browser,
    settings: &Settings,
    category: Option<&str>,
    limit: usize,
) -> Result<BatchStats> {
    let pairs = settings.keyword_pairs(category);
    if pairs.is_empty() {
        bail!("no keywords configured for category {:?}", category.unwrap_or("<all>"));
    }
    let store = Store::open(&settings.output_dir, &settings.language)?;

    let multi = MultiProgress::new();
    let pb = multi.add(ProgressBar::new(pairs.len() as u64));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );
    let spinner_style = ProgressStyle::default_spinner().template("{spinner} {msg}")?;

    let mut stats = BatchStats {
        keywords: pairs.len(),
        ok: 0,
        errors: 0,
        records: 0,
    };

    for (category, keyword) in &pairs {
        pb.set_message(keyword.clone());
        let spinner = multi.add(ProgressBar::new_spinner());
        spinner.set_style(spinner_style.clone());
        spinner.set_message(keyword.clone());
        spinner.enable_steady_tick(Duration::from_millis(120));

        let result = run_keyword(browser, settings, &store, category, keyword, limit, spinner.clone()).await;
        spinner.finish_and_clear();
        multi.remove(&spinner);
        match result {
            Ok(n) => {
                stats.ok += 1;
                stats.records += n;
            }
            Err(e) => {
                multi.suspend(|| error!(keyword = %keyword, "keyword skipped: {:#}", e));
                stats.errors += 1;
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(stats)
}

/// Search for `phrase`, deep-fetch every post link found, and dump the threads as JSON.
pub async fn run_query(
    browser: &dyn Browser,
    settings: &Settings,
    phrase: &str,
    limit: usize,
    output: Option<&Path>,
) -> Result<(PathBuf, usize)> {
    let url = search_url(&settings.host, phrase)?;
    let store = Store::open(&settings.output_dir, &settings.language)?;
    let tags = RunTags {
        keyword: phrase.to_string(),
        category: "search".to_string(),
        language_context: settings.language_context.clone(),
    };

    let mut seen = SeenIds::default();

    // Only followed threads are written, so only their records count toward the cap.
    info!(phrase, url = %url, "searching");
    let paginator = Paginator::new(settings, browser, limit, tags)
        .listing(url.as_str())
        .threads_only();
    let harvest = harvest(browser, settings, &url, paginator, &mut seen)
        .await
        .with_context(|| format!("could not open {}", url))?;
    if harvest.follow_errors > 0 {
        warn!(failed = harvest.follow_errors, "some posts could not be fetched");
    }

    let path = output.map_or_else(|| store.search_file(phrase), Path::to_path_buf);
    let path = store.write_json(&path, &harvest.threads)?;
    Ok((path, harvest.threads.len()))
}

/// Fetch one post permalink as `{url, thread, replies}`.
pub async fn fetch_thread(browser: &dyn Browser, settings: &Settings, url: &str) -> Result<Thread> {
    Url::parse(url).with_context(|| format!("not a URL: {:?}", url))?;
    let thread = paginate::fetch_thread(browser, settings, url, settings.navigation_timeout())
        .await
        .with_context(|| format!("could not fetch {}", url))?;
    Ok(thread)
}

/// Persisted ID count per taxonomy keyword, in taxonomy order.
pub fn stats(settings: &Settings) -> Result<Vec<(String, String, usize)>> {
    let store = Store::open(&settings.output_dir, &settings.language)?;
    Ok(settings
        .keyword_pairs(None)
        .into_iter()
        .map(|(category, keyword)| {
            let seen = dedup::load_seen(&store, &keyword);
            (category, keyword, seen.len())
        })
        .collect())
}
