use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Recoverable failures of the extraction pipeline.
///
/// None of these abort a whole run; the orchestrator decides per variant
/// whether a block, an item, a pagination loop or a keyword is dropped.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("selector {selector:?} did not appear on {url} within {timeout_secs}s")]
    ReadyTimeout {
        url: String,
        selector: String,
        timeout_secs: u64,
    },

    #[error("embedded block #{block} is not valid JSON: {source}")]
    MalformedDocument {
        block: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not measure page extent: {0}")]
    ExtentMeasurement(String),

    #[error("renderer error: {0}")]
    Render(String),

    #[error("no thread data found on {url}")]
    NoThreadData { url: String },

    #[error("could not read persisted output {}: {reason}", path.display())]
    PersistenceRead { path: PathBuf, reason: String },

    #[error("could not write output {}: {reason}", path.display())]
    Persist { path: PathBuf, reason: String },

    #[error("configuration error: {0}")]
    Config(String),
}
