use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_PROTECTION_WINDOW: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
struct Entry {
    created: Instant,
    version: Option<i64>,
}

/// Ids created locally within the last `window`.
///
/// A full refetch keeps the local copy of these ids, since a snapshot taken
/// concurrently with the create may not include the new row yet.
#[derive(Debug)]
pub struct RecentlyCreated {
    window: Duration,
    entries: HashMap<String, Entry>,
}

impl RecentlyCreated {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn mark(&mut self, id: impl Into<String>, version: Option<i64>) {
        self.entries.insert(
            id.into(),
            Entry {
                created: Instant::now(),
                version,
            },
        );
    }

    pub fn is_protected(&mut self, id: &str) -> bool {
        self.prune();
        self.entries.contains_key(id)
    }

    pub fn protected_ids(&mut self) -> HashSet<String> {
        self.prune();
        self.entries.keys().cloned().collect()
    }

    /// Ends protection early once the server reports a version at least as
    /// new as the one the create returned. Returns true if the id was released.
    pub fn acknowledge(&mut self, id: &str, seen_version: Option<i64>) -> bool {
        let acknowledged = match (self.entries.get(id), seen_version) {
            (Some(Entry { version: Some(created), .. }), Some(seen)) => seen >= *created,
            _ => false,
        };
        if acknowledged {
            self.entries.remove(id);
        }
        acknowledged
    }

    pub fn forget(&mut self, id: &str) {
        self.entries.remove(id);
    }

    pub fn prune(&mut self) {
        let window = self.window;
        self.entries
            .retain(|_, entry| entry.created.elapsed() < window);
    }

    pub fn len(&mut self) -> usize {
        self.prune();
        self.entries.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }
}

impl Default for RecentlyCreated {
    fn default() -> Self {
        Self::new(DEFAULT_PROTECTION_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ids_expire_after_the_window() {
        let mut recent = RecentlyCreated::default();
        recent.mark("t2", None);

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(recent.is_protected("t2"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!recent.is_protected("t2"));
        assert!(recent.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn acknowledgement_needs_a_version() {
        let mut recent = RecentlyCreated::default();
        recent.mark("unversioned", None);
        recent.mark("versioned", Some(4));

        assert!(!recent.acknowledge("unversioned", Some(9)));
        assert!(!recent.acknowledge("versioned", Some(3)));
        assert!(recent.acknowledge("versioned", Some(4)));

        let ids = recent.protected_ids();
        assert!(ids.contains("unversioned"));
        assert!(!ids.contains("versioned"));
    }
}
