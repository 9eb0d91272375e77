//! Wires the stores, socket, bridge and poller together for one signed-in
//! user.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::api::ApiClient;
use crate::config::Config;
use crate::models::User;
use crate::notify::Notifier;
use crate::realtime::{SocketClient, SocketOptions};
use crate::services::{EventBridge, FallbackPoller};
use crate::store::{BoardStore, ProjectStore, Stores, TaskStore, UiState};

pub struct SyncSession {
    user: User,
    stores: Stores,
    ui: UiState,
    notifier: Notifier,
    socket: SocketClient,
    bridge: EventBridge,
    poller: JoinHandle<()>,
    rooms: JoinHandle<()>,
}

impl SyncSession {
    /// `api` must already carry the user's token.
    pub async fn start(config: &Config, api: ApiClient, user: User) -> Self {
        let notifier = Notifier::new();
        let backend = Arc::new(api.clone());
        let stores = Stores {
            tasks: Arc::new(TaskStore::new(
                backend.clone(),
                notifier.clone(),
                config.create_protection,
            )),
            projects: Arc::new(ProjectStore::new(
                backend.clone(),
                notifier.clone(),
                config.create_protection,
            )),
            boards: Arc::new(BoardStore::new(
                backend,
                notifier.clone(),
                config.create_protection,
            )),
        };

        tokio::join!(
            stores.tasks.refresh(),
            stores.projects.refresh(),
            stores.projects.refresh_invitations(),
            stores.boards.refresh_boards(),
        );

        let socket = SocketClient::new(SocketOptions {
            url: config.ws_url.clone(),
            token: api.token().await,
            reconnect_attempts: config.reconnect_attempts,
            reconnect_delay: config.reconnect_delay,
        });
        let bridge = EventBridge::attach(socket.clone(), stores.clone(), user.clone()).await;
        sync_rooms(&socket, &stores).await;
        socket.connect().await;

        let rooms = tokio::spawn(follow_projects(socket.clone(), stores.clone()));

        let ui = UiState::new();
        let poller =
            FallbackPoller::new(socket.clone(), stores.clone(), ui.clone(), config.poll_interval)
                .spawn();

        tracing::info!(user_id = %user.id, "sync session started");
        Self {
            user,
            stores,
            ui,
            notifier,
            socket,
            bridge,
            poller,
            rooms,
        }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn tasks(&self) -> &Arc<TaskStore> {
        &self.stores.tasks
    }

    pub fn projects(&self) -> &Arc<ProjectStore> {
        &self.stores.projects
    }

    pub fn boards(&self) -> &Arc<BoardStore> {
        &self.stores.boards
    }

    pub fn ui(&self) -> &UiState {
        &self.ui
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn socket(&self) -> &SocketClient {
        &self.socket
    }

    pub async fn shutdown(self) {
        self.poller.abort();
        self.rooms.abort();
        self.bridge.detach().await;
        self.socket.disconnect().await;
        self.stores.tasks.clear().await;
        self.stores.projects.clear().await;
        self.stores.boards.clear().await;
        tracing::info!(user_id = %self.user.id, "sync session stopped");
    }
}

/// Makes the joined rooms match the held projects.
async fn sync_rooms(socket: &SocketClient, stores: &Stores) {
    let wanted: HashSet<String> = stores
        .projects
        .projects()
        .await
        .iter()
        .map(|p| p.id.clone())
        .collect();
    for room in socket.rooms().await {
        if !wanted.contains(&room) {
            socket.leave_project(&room).await;
        }
    }
    for id in &wanted {
        socket.join_project(id).await;
    }
}

async fn follow_projects(socket: SocketClient, stores: Stores) {
    let mut revisions = stores.projects.subscribe();
    while revisions.changed().await.is_ok() {
        sync_rooms(&socket, &stores).await;
    }
}
