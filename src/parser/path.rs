use serde_json::Value;

/// One dotted segment: `name`, `name[]` (flatten) or `name[N]` (index).
#[derive(Debug, Clone, Copy, PartialEq)]
enum Step<'p> {
    Key(&'p str),
    Flatten(&'p str),
    Index(&'p str, usize),
}

fn parse_step(segment: &str) -> Step<'_> {
    let Some(open) = segment.find('[') else {
        return Step::Key(segment);
    };
    let key = &segment[..open];
    let inner = segment[open + 1..].trim_end_matches(']');
    match inner.parse::<usize>() {
        Ok(n) => Step::Index(key, n),
        Err(_) => Step::Flatten(key),
    }
}

/// Evaluate a lookup expression such as `post.video_versions[].url`.
///
/// Missing keys and nulls drop out silently; a flatten step fans out over
/// array elements so later steps apply to each of them.
pub fn select<'a>(root: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![root];

    for segment in path.split('.') {
        let step = parse_step(segment);
        let mut next = Vec::with_capacity(current.len());
        for value in current {
            match step {
                Step::Key(key) => next.extend(value.get(key)),
                Step::Flatten(key) => {
                    if let Some(items) = value.get(key).and_then(Value::as_array) {
                        next.extend(items.iter());
                    }
                }
                Step::Index(key, n) => {
                    next.extend(value.get(key).and_then(|v| v.get(n)));
                }
            }
        }
        next.retain(|v| !v.is_null());
        current = next;
    }

    current
}

/// Values of the first path that yields anything.
pub fn select_any<'a>(root: &'a Value, paths: &[&str]) -> Vec<&'a Value> {
    paths
        .iter()
        .map(|p| select(root, p))
        .find(|found| !found.is_empty())
        .unwrap_or_default()
}
