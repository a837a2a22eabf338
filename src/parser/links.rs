use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};

static POST_LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*="/post/"]"#).unwrap());

/// A post permalink discovered on a listing page.
#[derive(Debug, Clone, PartialEq)]
pub struct PostLink {
    pub url: String,
    pub code: String,
}

/// Collect unique post links in document order, absolute against `host`.
pub fn post_links(html: &str, host: &str) -> Vec<PostLink> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for el in document.select(&POST_LINK_SEL) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let Some(link) = normalize(href, host) else {
            continue;
        };
        if seen.insert(link.code.clone()) {
            links.push(link);
        }
    }

    links
}

fn normalize(href: &str, host: &str) -> Option<PostLink> {
    let href = href.split(['?', '#']).next()?.trim_end_matches('/');
    let url = if href.starts_with('/') {
        format!("https://{}{}", host, href)
    } else {
        href.to_string()
    };

    // Only /@user/post/<code>; media sub-pages like /post/<code>/media are folded.
    let rest = &url[url.find("/post/")? + "/post/".len()..];
    let code = rest.split('/').next()?;
    if code.is_empty() {
        return None;
    }
    let url = format!("{}{}", &url[..url.find("/post/")? + "/post/".len()], code);
    Some(PostLink {
        url,
        code: code.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_links_become_absolute() {
        let html = r#"<a href="/@alice/post/Cabc123">x</a>"#;
        let links = post_links(html, "www.threads.net");
        assert_eq!(
            links,
            vec![PostLink {
                url: "https://www.threads.net/@alice/post/Cabc123".into(),
                code: "Cabc123".into(),
            }]
        );
    }

    #[test]
    fn duplicates_and_media_pages_fold() {
        let html = r#"
            <a href="/@alice/post/C1">a</a>
            <a href="/@alice/post/C1/media?x=1">b</a>
            <a href="https://www.threads.net/@bob/post/C2/">c</a>
            <a href="/@bob">profile</a>
            <a href="/@carol/post/">empty</a>
        "#;
        let codes: Vec<_> = post_links(html, "www.threads.net")
            .into_iter()
            .map(|l| l.code)
            .collect();
        assert_eq!(codes, ["C1", "C2"]);
    }
}
