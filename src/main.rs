mod config;
mod dedup;
mod error;
mod paginate;
mod parser;
mod record;
mod render;
mod run;
mod store;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use config::{RendererKind, Settings};
use render::http::HttpBrowser;
use render::Browser;
use store::Store;

#[derive(Parser)]
#[command(name = "threads_harvest", about = "Collect public Threads posts by keyword, search or permalink")]
struct Cli {
    /// Settings file (TOML); missing file means defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Page renderer to use
    #[arg(long, global = true, value_enum)]
    renderer: Option<RendererKind>,

    /// Show the browser window
    #[arg(long, global = true)]
    headful: bool,

    /// Output directory
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search one phrase and save every thread found as JSON
    Query {
        phrase: String,
        /// Max posts to collect (default: limit_per_keyword)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// JSON file to write (default: search_<phrase>_<ts>.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Walk the keyword taxonomy, one CSV per keyword
    Batch {
        /// Only this category (e.g. "happy")
        #[arg(long)]
        category: Option<String>,
        /// Max posts per keyword (default: limit_per_keyword)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Collect listing pages only, do not open posts
        #[arg(long)]
        no_follow: bool,
    },
    /// Fetch one post with its replies
    Thread {
        url: String,
        /// JSON file to write (default: print to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show persisted post counts per keyword
    Stats,
}

/// The launched page backend; Chromium must be shut down explicitly.
enum Backend {
    #[cfg(feature = "browser")]
    Chrome(render::chrome::ChromeBrowser),
    Http(HttpBrowser),
}

impl Backend {
    async fn launch(settings: &Settings) -> anyhow::Result<Self> {
        match settings.renderer {
            #[cfg(feature = "browser")]
            RendererKind::Chrome => Ok(Self::Chrome(render::chrome::ChromeBrowser::launch(settings).await?)),
            #[cfg(not(feature = "browser"))]
            RendererKind::Chrome => bail!("built without the `browser` feature; use --renderer http"),
            RendererKind::Http => Ok(Self::Http(HttpBrowser::new(settings)?)),
        }
    }

    fn browser(&self) -> &dyn Browser {
        match self {
            #[cfg(feature = "browser")]
            Self::Chrome(b) => b as &dyn Browser,
            Self::Http(b) => b as &dyn Browser,
        }
    }

    async fn shutdown(self) {
        match self {
            #[cfg(feature = "browser")]
            Self::Chrome(b) => b.shutdown().await,
            Self::Http(_) => {}
        }
    }
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let mut settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    if let Some(renderer) = cli.renderer {
        settings.renderer = renderer;
    }
    if cli.headful {
        settings.headless = false;
    }
    if let Some(dir) = &cli.output_dir {
        settings.output_dir = dir.clone();
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = load_settings(&cli)?;

    let result = match cli.command {
        Commands::Query { phrase, limit, output } => {
            let limit = limit.unwrap_or(settings.limit_per_keyword);
            let backend = Backend::launch(&settings).await?;
            let result = run::run_query(backend.browser(), &settings, &phrase, limit, output.as_deref()).await;
            backend.shutdown().await;
            let (path, threads) = result?;
            println!("Saved {} threads to {}", threads, path.display());
            Ok(())
        }
        Commands::Batch { category, limit, no_follow } => {
            if no_follow {
                settings.follow_posts = false;
            }
            let limit = limit.unwrap_or(settings.limit_per_keyword);
            let backend = Backend::launch(&settings).await?;
            let result = run::run_batch(backend.browser(), &settings, category.as_deref(), limit).await;
            backend.shutdown().await;
            let stats = result?;
            println!(
                "Done: {} keywords ({} ok, {} errors), {} new posts in {}.",
                stats.keywords,
                stats.ok,
                stats.errors,
                stats.records,
                settings.output_dir.display()
            );
            Ok(())
        }
        Commands::Thread { url, output } => {
            let backend = Backend::launch(&settings).await?;
            let result = run::fetch_thread(backend.browser(), &settings, &url).await;
            backend.shutdown().await;
            let thread = result?;
            match output {
                Some(path) => {
                    let path = write_thread(&settings, &path, &thread)?;
                    println!("Saved {} replies to {}", thread.replies.len(), path.display());
                }
                None => println!("{}", serde_json::to_string_pretty(&thread)?),
            }
            Ok(())
        }
        Commands::Stats => {
            let counts = run::stats(&settings)?;
            if counts.is_empty() {
                bail!("no keywords configured");
            }
            let mut total = 0;
            println!("{:<10} | {:<16} | {:>7}", "Category", "Keyword", "Posts");
            println!("{}", "-".repeat(39));
            for (category, keyword, n) in &counts {
                println!("{:<10} | {:<16} | {:>7}", category, keyword, n);
                total += n;
            }
            println!("\n{} posts across {} keywords in {}", total, counts.len(), settings.output_dir.display());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn write_thread(settings: &Settings, path: &Path, thread: &record::Thread) -> anyhow::Result<PathBuf> {
    let store = Store::open(&settings.output_dir, &settings.language)?;
    Ok(store.write_json(path, thread)?)
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
