use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, ScrapeError};

/// Server-script payloads are tagged with this literal (quotes included).
pub const STRUCTURAL_MARKER: &str = "\"ScheduledServerJS\"";
/// Only payloads carrying thread data mention this key.
pub const CONTENT_MARKER: &str = "thread_items";

static SCRIPT_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"script[type="application/json"][data-sjs]"#).unwrap());

/// An embedded JSON script that passed the marker filter.
#[derive(Debug, Clone)]
pub struct CandidateBlock {
    /// Position among all embedded scripts of the page, in document order.
    pub index: usize,
    pub text: String,
}

impl CandidateBlock {
    pub fn parse(&self) -> Result<Value> {
        serde_json::from_str(&self.text).map_err(|source| ScrapeError::MalformedDocument {
            block: self.index,
            source,
        })
    }
}

/// Cheap pre-filter: both markers must be present before a block is parsed.
pub fn is_candidate(text: &str) -> bool {
    text.contains(STRUCTURAL_MARKER) && text.contains(CONTENT_MARKER)
}

/// Collect the embedded JSON scripts of a page that may hold thread data.
pub fn candidate_blocks(html: &str) -> Vec<CandidateBlock> {
    let document = Html::parse_document(html);
    let mut total = 0;
    let blocks: Vec<CandidateBlock> = document
        .select(&SCRIPT_SEL)
        .enumerate()
        .filter_map(|(index, el)| {
            total += 1;
            let text: String = el.text().collect();
            is_candidate(&text).then_some(CandidateBlock { index, text })
        })
        .collect();

    debug!(
        scripts = total,
        candidates = blocks.len(),
        "filtered embedded script blocks"
    );
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(body: &str) -> String {
        format!(r#"<script type="application/json" data-sjs>{}</script>"#, body)
    }

    #[test]
    fn both_markers_required() {
        let html = format!(
            "<html><body>{}{}{}</body></html>",
            script(r#"{"require":["ScheduledServerJS"]}"#),
            script(r#"{"thread_items":[]}"#),
            script(r#"{"x":["ScheduledServerJS"],"thread_items":[]}"#),
        );
        let blocks = candidate_blocks(&html);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].index, 2);
    }

    #[test]
    fn structural_marker_is_case_sensitive_and_quoted() {
        assert!(!is_candidate(r#"{"scheduledserverjs":1,"thread_items":[]}"#));
        assert!(!is_candidate(r#"{"v":"ScheduledServerJSX","thread_items":[]}"#));
        assert!(is_candidate(r#"["ScheduledServerJS",{"thread_items":[]}]"#));
    }

    #[test]
    fn scripts_without_data_sjs_are_ignored() {
        let html = r#"<script type="application/json">{"a":"ScheduledServerJS","thread_items":1}</script>"#;
        assert!(candidate_blocks(html).is_empty());
    }

    #[test]
    fn malformed_candidate_reports_its_index() {
        let html = script(r#"{"ScheduledServerJS": "thread_items", oops"#);
        let blocks = candidate_blocks(&html);
        assert_eq!(blocks.len(), 1);
        match blocks[0].parse() {
            Err(ScrapeError::MalformedDocument { block, .. }) => assert_eq!(block, 0),
            other => panic!("expected malformed document, got {:?}", other),
        }
    }
}
