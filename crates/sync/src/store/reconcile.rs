//! Change detection and snapshot merging for server-fetched collections.

use std::collections::{HashMap, HashSet};

use crate::models::{Board, BoardElement, Project, Task};

/// An entity that can be reconciled against a server snapshot.
pub trait Versioned: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;
    fn updated_at(&self) -> &str;
    fn version(&self) -> Option<i64> {
        None
    }
}

/// Whether two copies of the same entity carry the same revision.
///
/// The monotonic `version` counter decides when both copies have one.
/// Otherwise the `updated_at` strings are compared verbatim. Copies with
/// neither a version nor a timestamp are never known to match.
pub fn same_revision<T: Versioned>(a: &T, b: &T) -> bool {
    match (a.version(), b.version()) {
        (Some(x), Some(y)) => x == y,
        _ if untracked(a) || untracked(b) => false,
        _ => a.updated_at() == b.updated_at(),
    }
}

/// Whether `incoming` is newer than `current`. Without versions on both
/// sides any differing timestamp counts as newer, and a copy without any
/// revision information always wins.
pub fn supersedes<T: Versioned>(incoming: &T, current: &T) -> bool {
    match (incoming.version(), current.version()) {
        (Some(x), Some(y)) => x > y,
        _ if untracked(incoming) || untracked(current) => true,
        _ => incoming.updated_at() != current.updated_at(),
    }
}

fn untracked<T: Versioned>(item: &T) -> bool {
    item.version().is_none() && item.updated_at().is_empty()
}

/// Decides whether replacing `current` with `incoming` would change anything
/// observable: length, id membership, or a per-id revision.
pub fn collection_changed<T: Versioned>(current: &[T], incoming: &[T]) -> bool {
    if current.len() != incoming.len() {
        return true;
    }

    let by_id: HashMap<&str, &T> = current.iter().map(|item| (item.id(), item)).collect();
    let mut seen = HashSet::with_capacity(incoming.len());

    for item in incoming {
        if !seen.insert(item.id()) {
            return true;
        }
        match by_id.get(item.id()) {
            Some(existing) if same_revision(*existing, item) => {}
            _ => return true,
        }
    }

    false
}

/// Merges a server snapshot with the locally held collection.
///
/// Incoming entries are deduplicated by id (first occurrence wins). Ids in
/// `protected` keep the local copy, which is appended when the snapshot does
/// not contain it yet.
pub fn merge_snapshot<T: Versioned>(
    current: &[T],
    incoming: Vec<T>,
    protected: &HashSet<String>,
) -> Vec<T> {
    let local: HashMap<&str, &T> = current
        .iter()
        .filter(|item| protected.contains(item.id()))
        .map(|item| (item.id(), item))
        .collect();

    let mut seen: HashSet<String> = HashSet::with_capacity(incoming.len());
    let mut merged = Vec::with_capacity(incoming.len() + local.len());

    for item in incoming {
        if !seen.insert(item.id().to_string()) {
            continue;
        }
        match local.get(item.id()) {
            Some(kept) => merged.push((*kept).clone()),
            None => merged.push(item),
        }
    }

    for item in current {
        if local.contains_key(item.id()) && !seen.contains(item.id()) {
            merged.push(item.clone());
        }
    }

    merged
}

impl Versioned for Task {
    fn id(&self) -> &str {
        &self.id
    }
    fn updated_at(&self) -> &str {
        &self.updated_at
    }
    fn version(&self) -> Option<i64> {
        self.version
    }
}

impl Versioned for Project {
    fn id(&self) -> &str {
        &self.id
    }
    fn updated_at(&self) -> &str {
        &self.updated_at
    }
    fn version(&self) -> Option<i64> {
        self.version
    }
}

impl Versioned for Board {
    fn id(&self) -> &str {
        &self.id
    }
    fn updated_at(&self) -> &str {
        &self.updated_at
    }
    fn version(&self) -> Option<i64> {
        self.version
    }
}

impl Versioned for BoardElement {
    fn id(&self) -> &str {
        &self.id
    }
    fn updated_at(&self) -> &str {
        &self.updated_at
    }
    fn version(&self) -> Option<i64> {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::task;

    fn versioned(id: &str, updated_at: &str, version: i64) -> Task {
        let mut t = task(id, updated_at);
        t.version = Some(version);
        t
    }

    #[test]
    fn identical_snapshots_are_unchanged() {
        let current = vec![task("t1", "t0"), task("t2", "t0")];
        let incoming = vec![task("t2", "t0"), task("t1", "t0")];
        assert!(!collection_changed(&current, &incoming));
    }

    #[test]
    fn newer_timestamp_is_a_change() {
        let current = vec![task("t1", "t0")];
        let incoming = vec![task("t1", "t1")];
        assert!(collection_changed(&current, &incoming));
    }

    #[test]
    fn membership_and_length_changes_are_detected() {
        let current = vec![task("t1", "t0")];
        assert!(collection_changed(&current, &[task("t2", "t0")]));
        assert!(collection_changed(&current, &[]));
        assert!(collection_changed(&current, &[task("t1", "t0"), task("t2", "t0")]));
    }

    #[test]
    fn duplicate_ids_in_incoming_are_a_change() {
        let current = vec![task("t1", "t0"), task("t2", "t0")];
        let incoming = vec![task("t1", "t0"), task("t1", "t0")];
        assert!(collection_changed(&current, &incoming));
    }

    #[test]
    fn version_wins_over_timestamp_when_present() {
        // Same timestamp, different version: a real edit that a timestamp
        // comparison would miss.
        let current = vec![versioned("t1", "t0", 1)];
        let incoming = vec![versioned("t1", "t0", 2)];
        assert!(collection_changed(&current, &incoming));

        // Different timestamp, same version: clock noise only.
        let incoming = vec![versioned("t1", "t9", 1)];
        assert!(!collection_changed(&current, &incoming));
    }

    #[test]
    fn supersedes_uses_version_ordering() {
        assert!(supersedes(&versioned("t1", "a", 3), &versioned("t1", "a", 2)));
        assert!(!supersedes(&versioned("t1", "b", 2), &versioned("t1", "a", 3)));
        assert!(supersedes(&task("t1", "b"), &task("t1", "a")));
        assert!(!supersedes(&task("t1", "a"), &task("t1", "a")));
    }

    #[test]
    fn copies_without_revision_info_always_apply() {
        assert!(supersedes(&task("t1", ""), &task("t1", "")));
        assert!(supersedes(&task("t1", ""), &task("t1", "a")));
        assert!(!same_revision(&task("t1", ""), &task("t1", "")));
        assert!(collection_changed(&[task("t1", "")], &[task("t1", "")]));
    }

    #[test]
    fn merge_dedupes_incoming_by_id() {
        let mut first = task("t1", "t0");
        first.title = "first".into();
        let mut second = task("t1", "t0");
        second.title = "second".into();

        let merged = merge_snapshot(&[], vec![first, second], &HashSet::new());
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title, "first");
    }

    #[test]
    fn merge_keeps_protected_local_copies() {
        let mut local_t2 = task("t2", "local");
        local_t2.title = "fresh".into();
        let current = vec![task("t1", "t0"), local_t2];
        let protected: HashSet<String> = ["t2".to_string(), "t3".to_string()].into();

        // Snapshot lags behind: no t2 at all.
        let merged = merge_snapshot(&current, vec![task("t1", "t1")], &protected);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].updated_at, "t1");
        assert_eq!(merged[1].title, "fresh");

        // Snapshot has a stale t2: local copy still wins, no duplicate.
        let merged = merge_snapshot(&current, vec![task("t2", "stale"), task("t1", "t1")], &protected);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].title, "fresh");
    }
}
