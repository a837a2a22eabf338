use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Result, ScrapeError};
use crate::record::PostRecord;

/// CSV columns, in file order.
const COLUMNS: [&str; 17] = [
    "id",
    "code",
    "url",
    "text",
    "published_on",
    "published_at",
    "username",
    "like_count",
    "reply_count",
    "repost_count",
    "image_count",
    "video_urls",
    "image_urls",
    "user_verified",
    "keyword",
    "category",
    "language_context",
];

const LIST_SEP: &str = "|";

#[derive(Serialize)]
struct CsvRow<'a> {
    id: &'a str,
    code: &'a str,
    url: &'a str,
    text: Option<&'a str>,
    published_on: Option<i64>,
    published_at: Option<String>,
    username: &'a str,
    like_count: i64,
    reply_count: i64,
    repost_count: i64,
    image_count: Option<i64>,
    video_urls: String,
    image_urls: String,
    user_verified: Option<bool>,
    keyword: Option<&'a str>,
    category: Option<&'a str>,
    language_context: Option<&'a str>,
}

impl<'a> From<&'a PostRecord> for CsvRow<'a> {
    fn from(r: &'a PostRecord) -> Self {
        Self {
            id: &r.id,
            code: &r.code,
            url: &r.url,
            text: r.text.as_deref(),
            published_on: r.published_on,
            published_at: r.published_at(),
            username: &r.username,
            like_count: r.like_count,
            reply_count: r.reply_count,
            repost_count: r.repost_count,
            image_count: r.image_count,
            video_urls: join(&r.video_urls),
            image_urls: join(&r.image_urls),
            user_verified: r.user_verified,
            keyword: r.keyword.as_deref(),
            category: r.category.as_deref(),
            language_context: r.language_context.as_deref(),
        }
    }
}

fn join<'a>(items: impl IntoIterator<Item = &'a String>) -> String {
    items
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(LIST_SEP)
}

/// IDs (and post codes) recovered from one earlier output file.
#[derive(Debug, Default)]
pub struct PersistedBatch {
    pub path: PathBuf,
    pub ids: Vec<String>,
    pub codes: Vec<String>,
}

/// File-backed output sink: one CSV per keyword run, JSON for thread dumps.
pub struct Store {
    dir: PathBuf,
    language: String,
}

/// Keyword as used in file names: whitespace runs become `_`, and so does
/// every character other than letters, digits, `-` and `_`.
pub fn slug(keyword: &str) -> String {
    keyword
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn unix_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl Store {
    pub fn open(dir: impl Into<PathBuf>, language: &str) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| ScrapeError::Persist {
            path: dir.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            dir,
            language: language.to_string(),
        })
    }

    fn batch_pattern(&self, keyword: &str) -> std::result::Result<Regex, regex::Error> {
        Regex::new(&format!(
            r"^threads_{}_{}_\d+\.csv$",
            regex::escape(&slug(keyword)),
            regex::escape(&self.language)
        ))
    }

    /// Write one keyword batch; a header row is written even when empty.
    pub fn persist(&self, keyword: &str, records: &[PostRecord]) -> Result<PathBuf> {
        let batch_path = |ts: i64| {
            self.dir
                .join(format!("threads_{}_{}_{}.csv", slug(keyword), self.language, ts))
        };
        // Never overwrite an earlier batch written within the same millisecond.
        let mut ts = unix_millis();
        while batch_path(ts).exists() {
            ts += 1;
        }
        let path = batch_path(ts);
        let fail = |e: &dyn std::fmt::Display| ScrapeError::Persist {
            path: path.clone(),
            reason: e.to_string(),
        };

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)
            .map_err(|e| fail(&e))?;
        writer.write_record(COLUMNS).map_err(|e| fail(&e))?;
        for record in records {
            writer.serialize(CsvRow::from(record)).map_err(|e| fail(&e))?;
        }
        writer.flush().map_err(|e| fail(&e))?;

        info!(keyword, rows = records.len(), path = %path.display(), "saved batch");
        Ok(path)
    }

    /// Every earlier batch for `keyword`. Unreadable files are logged and skipped.
    pub fn list_persisted(&self, keyword: &str) -> Vec<PersistedBatch> {
        let pattern = match self.batch_pattern(keyword) {
            Ok(pattern) => pattern,
            Err(e) => {
                warn!(keyword, "cannot match batch files: {}", e);
                return Vec::new();
            }
        };
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir.display(), "cannot list output directory: {}", e);
                return Vec::new();
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| pattern.is_match(n))
            })
            .collect();
        paths.sort();

        paths
            .into_iter()
            .filter_map(|path| match read_batch(&path) {
                Ok(batch) => {
                    debug!(path = %path.display(), ids = batch.ids.len(), "read persisted batch");
                    Some(batch)
                }
                Err(e) => {
                    warn!("{}", e);
                    None
                }
            })
            .collect()
    }

    /// Serialize `value` as pretty JSON at `path` (relative paths land in the output dir).
    pub fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<PathBuf> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.dir.join(path)
        };
        let fail = |e: &dyn std::fmt::Display| ScrapeError::Persist {
            path: path.clone(),
            reason: e.to_string(),
        };
        let file = File::create(&path).map_err(|e| fail(&e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), value).map_err(|e| fail(&e))?;
        info!(path = %path.display(), "saved json");
        Ok(path)
    }

    /// Default file name for a search dump.
    pub fn search_file(&self, phrase: &str) -> PathBuf {
        PathBuf::from(format!("search_{}_{}.json", slug(phrase), unix_millis()))
    }
}

fn read_batch(path: &Path) -> Result<PersistedBatch> {
    let fail = |reason: String| ScrapeError::PersistenceRead {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| fail(e.to_string()))?;
    let headers = reader.headers().map_err(|e| fail(e.to_string()))?.clone();
    let id_col = headers
        .iter()
        .position(|h| h == "id")
        .ok_or_else(|| fail("no id column".to_string()))?;
    let code_col = headers.iter().position(|h| h == "code");

    let mut batch = PersistedBatch {
        path: path.to_path_buf(),
        ..Default::default()
    };
    for (line, row) in reader.records().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                warn!(path = %path.display(), line = line + 2, "skipping unreadable row: {}", e);
                continue;
            }
        };
        if let Some(id) = row.get(id_col).filter(|id| !id.is_empty()) {
            batch.ids.push(id.to_string());
        }
        if let Some(code) = code_col.and_then(|c| row.get(c)).filter(|c| !c.is_empty()) {
            batch.codes.push(code.to_string());
        }
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: &str, code: &str) -> PostRecord {
        let mut r = PostRecord {
            id: id.to_string(),
            code: code.to_string(),
            username: "u".to_string(),
            text: Some("line one, with comma\nline two".to_string()),
            ..Default::default()
        };
        r.video_urls.insert("https://v/2.mp4".to_string());
        r.video_urls.insert("https://v/1.mp4".to_string());
        r
    }

    #[test]
    fn persisted_ids_round_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), "en").unwrap();
        store
            .persist("good vibes", &[post("1", "C1"), post("2", "C2")])
            .unwrap();

        let batches = store.list_persisted("good vibes");
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].ids, ["1", "2"]);
        assert_eq!(batches[0].codes, ["C1", "C2"]);
        let name = batches[0].path.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("threads_good_vibes_en_"), "{}", name);
    }

    #[test]
    fn empty_batch_still_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), "en").unwrap();
        let path = store.persist("life", &[]).unwrap();
        let body = fs::read_to_string(path).unwrap();
        assert_eq!(body.trim_end(), COLUMNS.join(","));
        assert!(store.list_persisted("life")[0].ids.is_empty());
    }

    #[test]
    fn keyword_files_do_not_bleed_into_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), "en").unwrap();
        store.persist("amazing day", &[post("a", "Ca")]).unwrap();
        store.persist("day", &[post("d", "Cd")]).unwrap();

        let ids: Vec<String> = store
            .list_persisted("day")
            .into_iter()
            .flat_map(|b| b.ids)
            .collect();
        assert_eq!(ids, ["d"]);
    }

    #[test]
    fn unreadable_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), "en").unwrap();
        fs::write(dir.path().join("threads_work_en_1.csv"), "code,text\nC1,x\n").unwrap();
        fs::write(dir.path().join("threads_work_en_2.csv"), "id,code\n7,C7\n").unwrap();

        let batches = store.list_persisted("work");
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].ids, ["7"]);
    }

    #[test]
    fn lists_are_joined() {
        let r = post("1", "C1");
        let row = CsvRow::from(&r);
        assert_eq!(row.video_urls, "https://v/1.mp4|https://v/2.mp4");
        assert_eq!(row.image_urls, "");
    }

    #[test]
    fn slug_collapses_whitespace() {
        assert_eq!(slug("  bad   day "), "bad_day");
        assert_eq!(slug("work"), "work");
    }

    #[test]
    fn slug_replaces_path_characters() {
        assert_eq!(slug("24/7"), "24_7");
        assert_eq!(slug(r"c:\tmp"), "c__tmp");
        assert_eq!(slug("../up"), "___up");
        assert_eq!(slug("café-au_lait"), "café-au_lait");
    }

    #[test]
    fn keyword_with_slash_persists_and_lists() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), "en").unwrap();
        let path = store.persist("24/7", &[post("9", "C9")]).unwrap();
        assert_eq!(path.parent(), Some(dir.path()));

        let batches = store.list_persisted("24/7");
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].ids, ["9"]);
    }
}
