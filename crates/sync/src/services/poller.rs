// Fixed-interval refetch that stands in for push updates while the socket
// is down.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::realtime::SocketClient;
use crate::store::{Stores, UiState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    SkippedConnected,
    /// A drag is in progress; a refetch could clobber the pointer-driven
    /// positions.
    SkippedDragging,
    Refreshed { changed: bool },
}

#[derive(Clone)]
pub struct FallbackPoller {
    socket: SocketClient,
    stores: Stores,
    ui: UiState,
    interval: Duration,
}

impl FallbackPoller {
    pub fn new(socket: SocketClient, stores: Stores, ui: UiState, interval: Duration) -> Self {
        Self {
            socket,
            stores,
            ui,
            interval,
        }
    }

    pub async fn poll_once(&self) -> PollOutcome {
        if self.socket.is_connected() {
            return PollOutcome::SkippedConnected;
        }
        if self.ui.is_dragging() {
            tracing::debug!("poll skipped during drag");
            return PollOutcome::SkippedDragging;
        }

        let (tasks, projects) =
            tokio::join!(self.stores.tasks.refresh(), self.stores.projects.refresh());
        let changed = tasks || projects;
        if changed {
            tracing::debug!(tasks, projects, "poll picked up changes");
        }
        PollOutcome::Refreshed { changed }
    }

    /// Starts polling on a background task. The first tick fires after one
    /// full interval.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + self.interval;
            let mut ticker = tokio::time::interval_at(start, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.poll_once().await;
            }
        })
    }
}
