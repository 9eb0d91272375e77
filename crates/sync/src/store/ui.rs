use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Ephemeral UI flags shared between the canvas and the background poller.
#[derive(Clone, Default)]
pub struct UiState {
    dragging: Arc<AtomicBool>,
}

impl UiState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging.load(Ordering::Acquire)
    }

    pub fn begin_drag(&self) {
        self.dragging.store(true, Ordering::Release);
    }

    pub fn end_drag(&self) {
        self.dragging.store(false, Ordering::Release);
    }

    /// Marks a drag in progress until the guard is dropped.
    pub fn drag_guard(&self) -> DragGuard {
        self.begin_drag();
        DragGuard {
            dragging: Arc::clone(&self.dragging),
        }
    }
}

pub struct DragGuard {
    dragging: Arc<AtomicBool>,
}

impl Drop for DragGuard {
    fn drop(&mut self) {
        self.dragging.store(false, Ordering::Release);
    }
}
