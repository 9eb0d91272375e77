//! Client-side state: one store per entity kind, each reconciling optimistic
//! local edits with fetched snapshots and pushed events.

pub mod auth;
pub mod boards;
pub mod collection;
pub mod projects;
pub mod recent;
pub mod reconcile;
pub mod tasks;
pub mod ui;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

pub use auth::{AuthStore, Claims};
pub use boards::BoardStore;
pub use collection::Collection;
pub use projects::{member_role, ProjectStore};
pub use recent::{RecentlyCreated, DEFAULT_PROTECTION_WINDOW};
pub use reconcile::{collection_changed, Versioned};
pub use tasks::TaskStore;
pub use ui::{DragGuard, UiState};

/// The stores a session keeps in sync, shared with the bridge and poller.
#[derive(Clone)]
pub struct Stores {
    pub tasks: Arc<TaskStore>,
    pub projects: Arc<ProjectStore>,
    pub boards: Arc<BoardStore>,
}
