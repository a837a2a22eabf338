use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::path::select_any;
use crate::record::PostRecord;

static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

pub const DEFAULT_HOST: &str = "www.threads.net";

/// Output field, the lookup paths tried in order, and how the hit is coerced.
struct FieldSpec {
    paths: &'static [&'static str],
    apply: fn(&mut PostRecord, &[&Value]),
}

static POST_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        paths: &["post.id"],
        apply: |r, v| r.id = text(v).unwrap_or_default(),
    },
    FieldSpec {
        paths: &["post.code"],
        apply: |r, v| r.code = text(v).unwrap_or_default(),
    },
    FieldSpec {
        paths: &["post.user.username"],
        apply: |r, v| r.username = text(v).unwrap_or_default(),
    },
    FieldSpec {
        paths: &["post.caption.text"],
        apply: |r, v| r.text = text(v),
    },
    FieldSpec {
        paths: &["post.taken_at"],
        apply: |r, v| r.published_on = v.first().and_then(|x| x.as_i64()),
    },
    FieldSpec {
        paths: &["post.like_count"],
        apply: |r, v| r.like_count = coerce_count(v.first().copied()),
    },
    FieldSpec {
        paths: &[
            "view_replies_cta_string",
            "post.text_post_app_info.direct_reply_count",
        ],
        apply: |r, v| r.reply_count = coerce_count(v.first().copied()),
    },
    FieldSpec {
        paths: &["post.carousel_media_count"],
        apply: |r, v| r.image_count = v.first().and_then(|x| x.as_i64()),
    },
    FieldSpec {
        paths: &["post.video_versions[].url"],
        apply: |r, v| r.video_urls = url_set(v),
    },
    FieldSpec {
        paths: &["post.carousel_media[].image_versions2.candidates[1].url"],
        apply: |r, v| r.image_urls = url_set(v),
    },
    FieldSpec {
        paths: &["post.pk"],
        apply: |r, v| r.pk = text(v),
    },
    FieldSpec {
        paths: &["post.user.profile_pic_url"],
        apply: |r, v| r.user_pic = text(v),
    },
    FieldSpec {
        paths: &["post.user.pk"],
        apply: |r, v| r.user_pk = text(v),
    },
    FieldSpec {
        paths: &["post.user.id"],
        apply: |r, v| r.user_id = text(v),
    },
    FieldSpec {
        paths: &["post.user.is_verified"],
        apply: |r, v| r.user_verified = v.first().and_then(|x| x.as_bool()),
    },
    FieldSpec {
        paths: &["post.has_audio"],
        apply: |r, v| r.has_audio = v.first().and_then(|x| x.as_bool()),
    },
];

fn text(values: &[&Value]) -> Option<String> {
    match values.first()? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn url_set(values: &[&Value]) -> BTreeSet<String> {
    values
        .iter()
        .filter_map(|v| v.as_str())
        .map(str::to_string)
        .collect()
}

/// Integers pass through; strings like `"128 replies"` yield their first
/// run of digits; anything else is 0.
pub fn coerce_count(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => leading_number(s),
        _ => 0,
    }
}

fn leading_number(s: &str) -> i64 {
    DIGITS_RE
        .find(s)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

pub fn post_url(host: &str, username: &str, code: &str) -> String {
    format!("https://{}/@{}/post/{}", host, username, code)
}

/// Map one `thread_items` entry onto a [`PostRecord`].
///
/// Returns `None` when the entry lacks the id, code or username needed for a
/// stable key and canonical URL. Every other field is optional.
pub fn project(subtree: &Value, host: &str) -> Option<PostRecord> {
    let mut record = PostRecord::default();
    for field in POST_FIELDS {
        let values = select_any(subtree, field.paths);
        (field.apply)(&mut record, &values);
    }

    if record.id.is_empty() || record.code.is_empty() || record.username.is_empty() {
        debug!(
            id = %record.id,
            code = %record.code,
            username = %record.username,
            "incomplete post, skipped"
        );
        return None;
    }

    record.url = post_url(host, &record.username, &record.code);
    record.repost_count = 0;
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item() -> Value {
        json!({
            "post": {
                "id": "3141_42",
                "pk": "3141",
                "code": "Cabc123",
                "taken_at": 1700000000,
                "like_count": 17,
                "caption": { "text": "hello" },
                "user": {
                    "username": "alice",
                    "is_verified": true,
                    "profile_pic_url": "pic",
                    "pk": "9001",
                    "id": 9001
                },
                "carousel_media_count": 2,
                "video_versions": [
                    { "url": "https://v/1.mp4" },
                    { "url": "https://v/1.mp4" },
                    { "url": "https://v/2.mp4" }
                ]
            },
            "view_replies_cta_string": "128 replies"
        })
    }

    #[test]
    fn full_item() {
        let r = project(&item(), DEFAULT_HOST).unwrap();
        assert_eq!(r.id, "3141_42");
        assert_eq!(r.text.as_deref(), Some("hello"));
        assert_eq!(r.published_on, Some(1_700_000_000));
        assert_eq!(r.like_count, 17);
        assert_eq!(r.reply_count, 128);
        assert_eq!(r.image_count, Some(2));
        assert_eq!(r.video_urls.len(), 2);
        assert_eq!(r.user_verified, Some(true));
        assert_eq!(r.user_pic.as_deref(), Some("pic"));
        assert_eq!(r.user_pk.as_deref(), Some("9001"));
        assert_eq!(r.user_id.as_deref(), Some("9001"));
        assert_eq!(r.repost_count, 0);
        assert!(r.image_urls.is_empty());
    }

    #[test]
    fn url_is_derived_not_read() {
        let mut v = item();
        v["post"]["url"] = json!("https://elsewhere/x");
        v["post"]["like_count"] = json!(999);
        let r = project(&v, DEFAULT_HOST).unwrap();
        assert_eq!(r.url, "https://www.threads.net/@alice/post/Cabc123");
    }

    #[test]
    fn reply_count_coercion() {
        assert_eq!(coerce_count(Some(&json!("128 replies"))), 128);
        assert_eq!(coerce_count(Some(&json!("replies"))), 0);
        assert_eq!(coerce_count(Some(&json!(42))), 42);
        assert_eq!(coerce_count(Some(&json!(null))), 0);
        assert_eq!(coerce_count(None), 0);
        assert_eq!(coerce_count(Some(&json!("99999999999999999999999 replies"))), 0);
    }

    #[test]
    fn reply_count_falls_back_to_direct_count() {
        let mut v = item();
        v.as_object_mut().unwrap().remove("view_replies_cta_string");
        v["post"]["text_post_app_info"] = json!({ "direct_reply_count": 5 });
        assert_eq!(project(&v, DEFAULT_HOST).unwrap().reply_count, 5);
    }

    #[test]
    fn missing_optional_fields_still_project() {
        let v = json!({ "post": { "id": 77, "code": "C1", "user": { "username": "bob" } } });
        let r = project(&v, DEFAULT_HOST).unwrap();
        assert_eq!(r.id, "77");
        assert_eq!(r.text, None);
        assert_eq!(r.like_count, 0);
        assert_eq!(r.reply_count, 0);
        assert_eq!(r.image_count, None);
        assert!(r.video_urls.is_empty());
        assert_eq!(r.user_pk, None);
        assert_eq!(r.user_id, None);
    }

    #[test]
    fn missing_identity_is_skipped() {
        let no_code = json!({ "post": { "id": "1", "user": { "username": "bob" } } });
        let no_user = json!({ "post": { "id": "1", "code": "C" } });
        let no_id = json!({ "post": { "code": "C", "user": { "username": "bob" } } });
        for v in [no_code, no_user, no_id] {
            assert!(project(&v, DEFAULT_HOST).is_none());
        }
    }
}
