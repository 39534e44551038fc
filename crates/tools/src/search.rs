use serde_json::{Map, Value};
use strata_common::Snapshot;

/// A leaf value whose path or contents matched a search term.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub path: Vec<String>,
    pub value: Value,
}

impl SearchHit {
    pub fn dotted(&self) -> String {
        self.path.join(".")
    }
}

/// Case-insensitive search over every leaf of a snapshot.
///
/// A leaf matches when its dotted path or its JSON text contains `term`.
/// Mappings are descended into; sequences and scalars are leaves. An empty
/// term matches every leaf.
pub fn search(snapshot: &Snapshot, term: &str) -> Vec<SearchHit> {
    let needle = term.to_lowercase();
    let mut hits = Vec::new();
    walk(snapshot.as_map(), &needle, &mut Vec::new(), &mut hits);
    hits
}

fn walk(map: &Map<String, Value>, needle: &str, path: &mut Vec<String>, hits: &mut Vec<SearchHit>) {
    for (key, value) in map {
        path.push(key.clone());
        match value {
            Value::Object(child) if !child.is_empty() => walk(child, needle, path, hits),
            leaf => {
                let matched = needle.is_empty()
                    || path.join(".").to_lowercase().contains(needle)
                    || leaf.to_string().to_lowercase().contains(needle);
                if matched {
                    hits.push(SearchHit {
                        path: path.clone(),
                        value: leaf.clone(),
                    });
                }
            }
        }
        path.pop();
    }
}
