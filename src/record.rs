use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// One normalized post, either a thread root or a reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: String,
    pub code: String,
    pub url: String,
    pub text: Option<String>,
    /// Unix seconds, as embedded upstream.
    pub published_on: Option<i64>,
    pub username: String,
    pub like_count: i64,
    pub reply_count: i64,
    pub image_count: Option<i64>,
    pub video_urls: BTreeSet<String>,
    pub image_urls: BTreeSet<String>,
    /// Upstream never exposes reposts.
    pub repost_count: i64,
    pub pk: Option<String>,
    pub user_pic: Option<String>,
    pub user_pk: Option<String>,
    pub user_id: Option<String>,
    pub user_verified: Option<bool>,
    pub has_audio: Option<bool>,
    pub keyword: Option<String>,
    pub category: Option<String>,
    pub language_context: Option<String>,
}

impl PostRecord {
    /// Attach the caller-supplied run tags.
    pub fn tag(&mut self, tags: &RunTags) {
        self.keyword = Some(tags.keyword.clone());
        self.category = Some(tags.category.clone());
        self.language_context = Some(tags.language_context.clone());
    }

    /// Publication time formatted as RFC 3339, when known.
    pub fn published_at(&self) -> Option<String> {
        let ts = self.published_on?;
        chrono::DateTime::from_timestamp(ts, 0).map(|dt| dt.to_rfc3339())
    }
}

/// Tags stamped onto every record accepted for one keyword.
#[derive(Debug, Clone)]
pub struct RunTags {
    pub keyword: String,
    pub category: String,
    pub language_context: String,
}

/// A root post and the replies extracted after it on the same page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub url: String,
    pub thread: PostRecord,
    pub replies: Vec<PostRecord>,
}

impl Thread {
    /// Split page-ordered records: the first is the root, the rest are replies.
    pub fn from_page(url: &str, mut records: Vec<PostRecord>) -> Option<Self> {
        if records.is_empty() {
            return None;
        }
        let replies = records.split_off(1);
        let thread = records.pop()?;
        Some(Self {
            url: url.to_string(),
            thread,
            replies,
        })
    }

    pub fn records(&self) -> impl Iterator<Item = &PostRecord> {
        std::iter::once(&self.thread).chain(self.replies.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: &str) -> PostRecord {
        PostRecord {
            id: id.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn first_record_is_root() {
        let t = Thread::from_page("u", vec![post("a"), post("b"), post("c")]).unwrap();
        assert_eq!(t.thread.id, "a");
        let ids: Vec<_> = t.replies.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["b", "c"]);
        assert_eq!(t.records().count(), 3);
    }

    #[test]
    fn empty_page_has_no_thread() {
        assert!(Thread::from_page("u", Vec::new()).is_none());
    }

    #[test]
    fn published_at_formats_unix_seconds() {
        let mut p = post("a");
        p.published_on = Some(0);
        assert_eq!(p.published_at().as_deref(), Some("1970-01-01T00:00:00+00:00"));
    }
}
