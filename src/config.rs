use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, ScrapeError};
use crate::parser::project::DEFAULT_HOST;

pub const DEFAULT_CONFIG_FILE: &str = "threads_harvest.toml";
const ENV_PREFIX: &str = "THREADS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    /// Headless Chromium over CDP
    Chrome,
    /// Plain HTTP GET, no scrolling
    Http,
}

/// One sentiment bucket of the search taxonomy.
#[derive(Debug, Clone, Deserialize)]
pub struct KeywordGroup {
    pub category: String,
    pub terms: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub limit_per_keyword: usize,
    pub scroll_step: i64,
    pub scroll_delay_secs: f64,
    pub stable_rounds: u32,
    pub post_delay_secs: f64,
    pub navigation_timeout_secs: u64,
    pub post_timeout_secs: u64,
    pub ready_timeout_secs: u64,
    pub ready_selector: String,
    pub host: String,
    pub language: String,
    pub language_context: String,
    pub locale: String,
    pub accept_language: String,
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub headless: bool,
    pub follow_posts: bool,
    pub renderer: RendererKind,
    pub keywords: Vec<KeywordGroup>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data/english"),
            limit_per_keyword: 5000,
            scroll_step: 4000,
            scroll_delay_secs: 2.0,
            stable_rounds: 1,
            post_delay_secs: 0.5,
            navigation_timeout_secs: 60,
            post_timeout_secs: 20,
            ready_timeout_secs: 8,
            ready_selector: "[data-pressable-container=true]".to_string(),
            host: DEFAULT_HOST.to_string(),
            language: "en".to_string(),
            language_context: "english".to_string(),
            locale: "en-US".to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64)".to_string(),
            viewport: (1920, 1080),
            headless: true,
            follow_posts: true,
            renderer: RendererKind::Chrome,
            keywords: default_keywords(),
        }
    }
}

fn group(category: &str, terms: &[&str]) -> KeywordGroup {
    KeywordGroup {
        category: category.to_string(),
        terms: terms.iter().map(|t| t.to_string()).collect(),
    }
}

pub fn default_keywords() -> Vec<KeywordGroup> {
    vec![
        group("sad", &["suicide"]),
        group(
            "neutral",
            &[
                "life", "work", "school", "friends", "weather", "family", "travel", "morning",
                "routine", "food", "study", "weekend", "day", "evening", "city",
            ],
        ),
        group(
            "happy",
            &[
                "happy", "happiness", "joy", "smile", "love", "success", "motivation",
                "good vibes", "grateful", "blessed", "proud", "amazing day", "sunshine",
            ],
        ),
    ]
}

impl Settings {
    /// Defaults, then the optional TOML file, then `THREADS__*` env vars.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let file = file.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let settings: Settings = config::Config::builder()
            .add_source(config::File::from(file).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ScrapeError::Config(e.to_string()))?;
        settings.validated()
    }

    fn validated(mut self) -> Result<Self> {
        if self.host.trim().is_empty() {
            return Err(ScrapeError::Config("host must not be empty".into()));
        }
        if self.scroll_delay_secs < 0.0 || self.post_delay_secs < 0.0 {
            return Err(ScrapeError::Config("delays must not be negative".into()));
        }
        self.stable_rounds = self.stable_rounds.max(1);
        Ok(self)
    }

    /// (category, keyword) pairs in taxonomy order, optionally one category only.
    pub fn keyword_pairs(&self, only: Option<&str>) -> Vec<(String, String)> {
        self.keywords
            .iter()
            .filter(|g| only.map_or(true, |c| g.category == c))
            .flat_map(|g| g.terms.iter().map(|t| (g.category.clone(), t.clone())))
            .collect()
    }

    pub fn scroll_delay(&self) -> Duration {
        Duration::from_secs_f64(self.scroll_delay_secs)
    }

    pub fn post_delay(&self) -> Duration {
        Duration::from_secs_f64(self.post_delay_secs)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn post_timeout(&self) -> Duration {
        Duration::from_secs(self.post_timeout_secs)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let s = Settings::load(Some(Path::new("does/not/exist.toml"))).unwrap();
        assert_eq!(s.limit_per_keyword, 5000);
        assert_eq!(s.stable_rounds, 1);
        assert_eq!(s.host, "www.threads.net");
        assert_eq!(s.keyword_pairs(None).len(), 29);
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        std::fs::write(
            &path,
            r#"
limit_per_keyword = 10
stable_rounds = 0
renderer = "http"

[[keywords]]
category = "calm"
terms = ["tea", "rain"]
"#,
        )
        .unwrap();
        let s = Settings::load(Some(&path)).unwrap();
        assert_eq!(s.limit_per_keyword, 10);
        assert_eq!(s.stable_rounds, 1);
        assert_eq!(s.renderer, RendererKind::Http);
        assert_eq!(
            s.keyword_pairs(Some("calm")),
            vec![("calm".to_string(), "tea".to_string()), ("calm".to_string(), "rain".to_string())]
        );
        assert!(s.keyword_pairs(Some("sad")).is_empty());
    }

    #[test]
    fn negative_delay_is_rejected() {
        let s = Settings {
            post_delay_secs: -1.0,
            ..Default::default()
        };
        assert!(s.validated().is_err());
    }
}
