use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};

use super::recent::RecentlyCreated;
use super::reconcile::{collection_changed, merge_snapshot, Versioned};

struct State<T> {
    items: Arc<Vec<T>>,
    revision: u64,
    recent: RecentlyCreated,
}

impl<T: Versioned> State<T> {
    fn publish(&mut self, items: Vec<T>, revision_tx: &watch::Sender<u64>) {
        self.items = Arc::new(items);
        self.revision += 1;
        revision_tx.send_replace(self.revision);
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }
}

/// A server-backed collection held in memory for the life of a session.
///
/// Every change swaps in a new `Arc<Vec<T>>` and bumps the revision, which
/// subscribers observe through [`Collection::subscribe`]. A reconciliation
/// that finds nothing new keeps the existing `Arc` and revision.
pub struct Collection<T> {
    state: RwLock<State<T>>,
    revision_tx: watch::Sender<u64>,
}

impl<T: Versioned> Collection<T> {
    pub fn new(protection_window: Duration) -> Self {
        let (revision_tx, _) = watch::channel(0);
        Self {
            state: RwLock::new(State {
                items: Arc::new(Vec::new()),
                revision: 0,
                recent: RecentlyCreated::new(protection_window),
            }),
            revision_tx,
        }
    }

    pub async fn snapshot(&self) -> Arc<Vec<T>> {
        Arc::clone(&self.state.read().await.items)
    }

    pub async fn get(&self, id: &str) -> Option<T> {
        let state = self.state.read().await;
        state.items.iter().find(|item| item.id() == id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.state.read().await.position(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn revision(&self) -> u64 {
        self.state.read().await.revision
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision_tx.subscribe()
    }

    pub async fn is_recently_created(&self, id: &str) -> bool {
        self.state.write().await.recent.is_protected(id)
    }

    /// Folds a full server snapshot into the collection. Returns whether the
    /// stored collection was replaced.
    pub async fn reconcile(&self, incoming: Vec<T>) -> bool {
        let mut state = self.state.write().await;

        for item in &incoming {
            state.recent.acknowledge(item.id(), item.version());
        }
        let protected = state.recent.protected_ids();
        let merged = merge_snapshot(&state.items, incoming, &protected);

        if !collection_changed(&state.items, &merged) {
            tracing::debug!(revision = state.revision, "snapshot unchanged");
            return false;
        }
        state.publish(merged, &self.revision_tx);
        true
    }

    /// Inserts an entity returned by a local create and shields it from
    /// stale snapshots for the protection window.
    pub async fn insert_created(&self, item: T) {
        let mut state = self.state.write().await;
        state.recent.mark(item.id().to_string(), item.version());
        let mut items = (*state.items).clone();
        match state.position(item.id()) {
            Some(index) => items[index] = item,
            None => items.push(item),
        }
        state.publish(items, &self.revision_tx);
    }

    /// Appends `item` unless an entity with the same id is already held.
    pub async fn insert_if_absent(&self, item: T) -> bool {
        let mut state = self.state.write().await;
        if state.position(item.id()).is_some() {
            return false;
        }
        let mut items = (*state.items).clone();
        items.push(item);
        state.publish(items, &self.revision_tx);
        true
    }

    /// Replaces the held copy or appends a new one.
    pub async fn upsert(&self, item: T) {
        let mut state = self.state.write().await;
        let mut items = (*state.items).clone();
        match state.position(item.id()) {
            Some(index) => items[index] = item,
            None => items.push(item),
        }
        state.publish(items, &self.revision_tx);
    }

    /// Replaces the held copy only. Returns false if the id is unknown.
    pub async fn replace(&self, item: T) -> bool {
        let mut state = self.state.write().await;
        let Some(index) = state.position(item.id()) else {
            return false;
        };
        let mut items = (*state.items).clone();
        items[index] = item;
        state.publish(items, &self.revision_tx);
        true
    }

    /// Mutates one entity in place, returning its pre-mutation copy.
    pub async fn patch<F>(&self, id: &str, f: F) -> Option<T>
    where
        F: FnOnce(&mut T),
    {
        let mut state = self.state.write().await;
        let index = state.position(id)?;
        let mut items = (*state.items).clone();
        let previous = items[index].clone();
        f(&mut items[index]);
        state.publish(items, &self.revision_tx);
        Some(previous)
    }

    /// Puts back a pre-mutation copy captured by [`Collection::patch`].
    pub async fn restore(&self, previous: T) {
        if !self.replace(previous).await {
            tracing::debug!("rollback target no longer present");
        }
    }

    pub async fn remove(&self, id: &str) -> Option<(usize, T)> {
        let mut state = self.state.write().await;
        let index = state.position(id)?;
        let mut items = (*state.items).clone();
        let removed = items.remove(index);
        state.recent.forget(id);
        state.publish(items, &self.revision_tx);
        Some((index, removed))
    }

    /// Puts a removed entity back at its old index (clamped to the length).
    pub async fn reinsert(&self, index: usize, item: T) {
        let mut state = self.state.write().await;
        if state.position(item.id()).is_some() {
            return;
        }
        let mut items = (*state.items).clone();
        let index = index.min(items.len());
        items.insert(index, item);
        state.publish(items, &self.revision_tx);
    }

    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        if state.items.is_empty() {
            return;
        }
        state.publish(Vec::new(), &self.revision_tx);
    }
}

impl<T: Versioned> Default for Collection<T> {
    fn default() -> Self {
        Self::new(super::recent::DEFAULT_PROTECTION_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::task;

    #[tokio::test]
    async fn unchanged_snapshot_keeps_the_same_arc() {
        let tasks = Collection::default();
        assert!(tasks.reconcile(vec![task("t1", "t0")]).await);
        let before = tasks.snapshot().await;
        let revision = tasks.revision().await;

        assert!(!tasks.reconcile(vec![task("t1", "t0")]).await);
        assert!(Arc::ptr_eq(&before, &tasks.snapshot().await));
        assert_eq!(tasks.revision().await, revision);

        assert!(tasks.reconcile(vec![task("t1", "t1")]).await);
        assert!(!Arc::ptr_eq(&before, &tasks.snapshot().await));
        assert_eq!(tasks.get("t1").await.unwrap().updated_at, "t1");
    }

    #[tokio::test(start_paused = true)]
    async fn created_item_survives_a_lagging_snapshot() {
        let tasks = Collection::default();
        tasks.reconcile(vec![task("t1", "t0")]).await;
        tasks.insert_created(task("t2", "t0")).await;

        tokio::time::advance(Duration::from_secs(9)).await;
        tasks.reconcile(vec![task("t1", "t0")]).await;
        assert!(tasks.contains("t2").await);

        // Snapshot catches up: still exactly one t2.
        tasks.reconcile(vec![task("t1", "t0"), task("t2", "t0")]).await;
        assert_eq!(tasks.len().await, 2);

        tokio::time::advance(Duration::from_secs(2)).await;
        tasks.reconcile(vec![task("t1", "t0")]).await;
        assert!(!tasks.contains("t2").await);
    }

    #[tokio::test]
    async fn patch_and_restore_round_trip() {
        let tasks = Collection::default();
        tasks.reconcile(vec![task("t1", "t0"), task("t2", "t0")]).await;
        let before = tasks.snapshot().await;

        let previous = tasks
            .patch("t1", |t| t.title = "optimistic".into())
            .await
            .unwrap();
        assert_eq!(tasks.get("t1").await.unwrap().title, "optimistic");

        tasks.restore(previous).await;
        assert_eq!(*tasks.snapshot().await, *before);
    }

    #[tokio::test]
    async fn remove_and_reinsert_keep_position() {
        let tasks = Collection::default();
        tasks
            .reconcile(vec![task("a", "0"), task("b", "0"), task("c", "0")])
            .await;
        let before = tasks.snapshot().await;

        let (index, removed) = tasks.remove("b").await.unwrap();
        assert_eq!(index, 1);
        assert_eq!(tasks.len().await, 2);

        tasks.reinsert(index, removed).await;
        assert_eq!(*tasks.snapshot().await, *before);
    }

    #[tokio::test]
    async fn insert_if_absent_dedupes() {
        let tasks = Collection::default();
        assert!(tasks.insert_if_absent(task("t1", "a")).await);
        assert!(!tasks.insert_if_absent(task("t1", "b")).await);
        assert_eq!(tasks.get("t1").await.unwrap().updated_at, "a");
    }

    #[tokio::test]
    async fn subscribers_see_revisions() {
        let tasks = Collection::default();
        let mut rx = tasks.subscribe();
        tasks.upsert(task("t1", "a")).await;
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 1);
    }
}
