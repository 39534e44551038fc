use serde::Serialize;
use serde_json::{Map, Value};
use strata_common::Snapshot;

/// How a single path changed between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeKind {
    Added,
    Removed,
    Changed,
}

/// One leaf-level difference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffEntry {
    /// Key segments from the snapshot root to the changed value.
    pub path: Vec<String>,
    /// Value before the change; `None` when the key was added.
    pub old: Option<Value>,
    /// Value after the change; `None` when the key was removed.
    pub new: Option<Value>,
}

impl DiffEntry {
    /// The path joined with `.`, e.g. `user.address.city`.
    pub fn dotted(&self) -> String {
        self.path.join(".")
    }

    pub fn kind(&self) -> ChangeKind {
        match (&self.old, &self.new) {
            (None, _) => ChangeKind::Added,
            (_, None) => ChangeKind::Removed,
            _ => ChangeKind::Changed,
        }
    }
}

impl std::fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path = self.dotted();
        match (&self.old, &self.new) {
            (Some(old), Some(new)) => write!(f, "~ {path}: {old} -> {new}"),
            (None, Some(new)) => write!(f, "+ {path}: {new}"),
            (Some(old), None) => write!(f, "- {path}: {old}"),
            (None, None) => write!(f, "  {path}"),
        }
    }
}

/// Structural diff from `prev` to `curr`.
///
/// Keys are visited in `curr` order. When both sides hold a mapping the walk
/// recurses and reports only leaf differences; any other unequal pair is one
/// entry. Keys present only in `prev` follow as removals.
pub fn diff(prev: &Snapshot, curr: &Snapshot) -> Vec<DiffEntry> {
    let mut out = Vec::new();
    diff_maps(prev.as_map(), curr.as_map(), &mut Vec::new(), &mut out);
    out
}

fn diff_maps(
    prev: &Map<String, Value>,
    curr: &Map<String, Value>,
    path: &mut Vec<String>,
    out: &mut Vec<DiffEntry>,
) {
    for (key, new) in curr {
        path.push(key.clone());
        match (prev.get(key), new) {
            (Some(old), new) if old == new => {}
            (Some(Value::Object(old_map)), Value::Object(new_map)) => {
                diff_maps(old_map, new_map, path, out);
            }
            (old, new) => out.push(DiffEntry {
                path: path.clone(),
                old: old.cloned(),
                new: Some(new.clone()),
            }),
        }
        path.pop();
    }

    for (key, old) in prev {
        if !curr.contains_key(key) {
            path.push(key.clone());
            out.push(DiffEntry {
                path: path.clone(),
                old: Some(old.clone()),
                new: None,
            });
            path.pop();
        }
    }
}
