use std::collections::HashSet;

use tracing::{debug, info};

use crate::record::PostRecord;
use crate::store::Store;

/// IDs already persisted or already accepted during the current keyword run.
///
/// Built once per keyword, only grows, and is dropped with the run. Post
/// codes are tracked alongside so a permalink is followed at most once.
#[derive(Debug, Default)]
pub struct SeenIds {
    persisted: HashSet<String>,
    run: HashSet<String>,
    codes: HashSet<String>,
}

impl SeenIds {
    pub fn with_persisted(persisted: HashSet<String>) -> Self {
        Self {
            persisted,
            ..Default::default()
        }
    }

    pub fn with_codes(mut self, codes: HashSet<String>) -> Self {
        self.codes = codes;
        self
    }

    /// True the first time a post code is offered for following.
    pub fn visit_code(&mut self, code: &str) -> bool {
        !code.is_empty() && self.codes.insert(code.to_string())
    }

    /// Reserve the record's id if it is non-empty and unseen.
    pub fn accept(&mut self, record: &PostRecord) -> bool {
        let id = record.id.as_str();
        if id.is_empty() {
            debug!(url = %record.url, "record without id rejected");
            return false;
        }
        if self.persisted.contains(id) {
            debug!(id, "already persisted, skipped");
            return false;
        }
        if !self.run.insert(id.to_string()) {
            debug!(id, "already seen this run, skipped");
            return false;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.persisted.len() + self.run.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rebuild the seen set for `keyword` from every batch persisted before.
pub fn load_seen(store: &Store, keyword: &str) -> SeenIds {
    let mut ids = HashSet::new();
    let mut codes = HashSet::new();
    for batch in store.list_persisted(keyword) {
        debug!(path = %batch.path.display(), ids = batch.ids.len(), "merging batch");
        ids.extend(batch.ids);
        codes.extend(batch.codes);
    }
    info!(keyword, existing = ids.len(), "loaded persisted ids");
    SeenIds::with_persisted(ids).with_codes(codes)
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
    fn one_accept_per_distinct_id_in_any_order() {
        let ids = ["a", "b", "a", "c", "b", "a", "d"];
        let mut orders = vec![ids.to_vec()];
        let mut rev = ids.to_vec();
        rev.reverse();
        orders.push(rev);
        let mut rotated = ids.to_vec();
        rotated.rotate_left(3);
        orders.push(rotated);

        for order in orders {
            let mut seen = SeenIds::default();
            let mut accepted: Vec<&str> = order
                .iter()
                .copied()
                .filter(|id| seen.accept(&post(id)))
                .collect();
            accepted.sort_unstable();
            assert_eq!(accepted, ["a", "b", "c", "d"]);
        }
    }

    #[test]
    fn first_duplicate_in_batch_wins() {
        let mut seen = SeenIds::default();
        assert!(seen.accept(&post("x")));
        assert!(!seen.accept(&post("x")));
    }

    #[test]
    fn persisted_ids_are_rejected() {
        let mut seen = SeenIds::with_persisted(HashSet::from(["old".to_string()]));
        assert!(!seen.accept(&post("old")));
        assert!(seen.accept(&post("new")));
        assert!(!seen.accept(&post("new")));
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn codes_are_visited_once() {
        let mut seen = SeenIds::default().with_codes(HashSet::from(["Cold".to_string()]));
        assert!(!seen.visit_code("Cold"));
        assert!(seen.visit_code("Cnew"));
        assert!(!seen.visit_code("Cnew"));
        assert!(!seen.visit_code(""));
    }

    #[test]
    fn empty_id_is_never_accepted() {
        let mut seen = SeenIds::default();
        assert!(!seen.accept(&post("")));
        assert!(seen.is_empty());
    }
}
