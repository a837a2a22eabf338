pub mod blocks;
pub mod links;
pub mod lookup;
pub mod path;
pub mod project;

use std::collections::HashSet;

use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, warn};

use crate::record::{PostRecord, Thread};

/// Key under which the host app nests thread groups.
pub const THREAD_ITEMS_KEY: &str = "thread_items";

/// html → candidate blocks → `thread_items` groups → records, in document order.
///
/// Malformed blocks are logged with `url` and skipped. Records are unique by id within
/// the page; the first occurrence wins.
pub fn extract_posts(html: &str, url: &str, host: &str) -> Vec<PostRecord> {
    let candidates = blocks::candidate_blocks(html);

    // Parse off the render loop's thread; collect keeps document order.
    let parsed: Vec<Option<Value>> = candidates
        .par_iter()
        .map(|block| match block.parse() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(url, "skipping embedded block: {}", e);
                None
            }
        })
        .collect();

    let mut seen = HashSet::new();
    let mut posts = Vec::new();

    for document in parsed.iter().flatten() {
        for group in lookup::find_all(document, THREAD_ITEMS_KEY) {
            let items: Vec<&Value> = match group {
                Value::Array(items) => items.iter().collect(),
                other => vec![other],
            };
            for item in items {
                let Some(post) = project::project(item, host) else {
                    continue;
                };
                if !seen.insert(post.id.clone()) {
                    debug!(id = %post.id, "duplicate post on page, skipped");
                    continue;
                }
                posts.push(post);
            }
        }
    }

    debug!(posts = posts.len(), "extracted posts from page");
    posts
}

/// Single-post page: the first record is the root, the rest are its replies.
pub fn extract_thread(html: &str, url: &str, host: &str) -> Option<Thread> {
    Thread::from_page(url, extract_posts(html, url, host))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::SeenIds;
    use crate::parser::project::DEFAULT_HOST;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    #[test]
    fn thread_page_end_to_end() {
        let html = fixture("thread");
        let posts = extract_posts(&html, "https://www.threads.net/@alice/post/Croot", DEFAULT_HOST);
        assert_eq!(posts.len(), 3);

        let thread = extract_thread(&html, "https://www.threads.net/@alice/post/Croot", DEFAULT_HOST)
            .unwrap();
        assert_eq!(thread.thread.code, "Croot");
        assert_eq!(thread.thread.reply_count, 2);
        let reply_codes: Vec<_> = thread.replies.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(reply_codes, ["Creply1", "Creply2"]);

        let mut seen = SeenIds::default();
        assert!(posts.iter().all(|p| seen.accept(p)));
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn malformed_block_does_not_abort_page() {
        let html = fixture("malformed");
        let posts = extract_posts(&html, "https://www.threads.net/@dave/post/Cdave", DEFAULT_HOST);
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].username, "dave");
    }

    #[test]
    fn repeated_ids_on_one_page_collapse() {
        let block = r#"{"require":[["ScheduledServerJS"]],"a":{"thread_items":[
            {"post":{"id":"1","code":"C1","user":{"username":"u"}}}
        ]},"b":{"thread_items":[
            {"post":{"id":"1","code":"C1","user":{"username":"u"}}},
            {"post":{"id":"2","code":"C2","user":{"username":"u"}}}
        ]}}"#;
        let html = format!(r#"<script type="application/json" data-sjs>{}</script>"#, block);
        let ids: Vec<_> = extract_posts(&html, "https://www.threads.net/tag/x", DEFAULT_HOST)
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, ["1", "2"]);
    }

    #[test]
    fn page_without_thread_data_has_no_thread() {
        let html = "<html><body><p>nothing here</p></body></html>";
        assert!(extract_thread(html, "u", DEFAULT_HOST).is_none());
    }
}
