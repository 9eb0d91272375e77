// Applies server-pushed socket events to the stores.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::models::User;
use crate::realtime::events::ServerEvent;
use crate::realtime::{ListenerId, SocketClient};
use crate::store::Stores;

/// Live subscription of the stores to the socket's named events.
///
/// Socket listeners only decode and enqueue; a single consumer task applies
/// events in the order they arrived.
pub struct EventBridge {
    socket: SocketClient,
    listeners: Vec<ListenerId>,
    worker: JoinHandle<()>,
}

impl EventBridge {
    pub async fn attach(socket: SocketClient, stores: Stores, current_user: User) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<ServerEvent>();

        let mut listeners = Vec::with_capacity(ServerEvent::NAMES.len());
        for name in ServerEvent::NAMES {
            let tx = tx.clone();
            let id = socket
                .on(name, move |data| match ServerEvent::decode(name, data) {
                    Ok(event) => {
                        let _ = tx.send(event);
                    }
                    Err(err) => {
                        tracing::warn!(event = name, error = %err, "dropping malformed event");
                    }
                })
                .await;
            listeners.push(id);
        }

        let applier = Applier {
            stores,
            socket: socket.clone(),
            user: current_user,
        };
        let worker = tokio::spawn(applier.run(rx));

        tracing::debug!(listeners = listeners.len(), "event bridge attached");
        Self {
            socket,
            listeners,
            worker,
        }
    }

    pub async fn detach(self) {
        for id in &self.listeners {
            self.socket.off(*id).await;
        }
        self.worker.abort();
        tracing::debug!("event bridge detached");
    }
}

struct Applier {
    stores: Stores,
    socket: SocketClient,
    user: User,
}

impl Applier {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<ServerEvent>) {
        while let Some(event) = rx.recv().await {
            let name = event_name(&event);
            let applied = self.apply(event).await;
            tracing::debug!(event = name, applied, "applied push event");
        }
    }

    /// Returns whether the event changed any store.
    async fn apply(&self, event: ServerEvent) -> bool {
        let Stores {
            tasks,
            projects,
            boards,
        } = &self.stores;

        match event {
            ServerEvent::TaskCreated(task) => tasks.apply_created(task).await,
            ServerEvent::TaskUpdated(task) => tasks.apply_updated(task).await,
            ServerEvent::TaskDeleted(r) => tasks.apply_deleted(&r.task_id).await,
            ServerEvent::CommentAdded(e) => {
                tasks
                    .apply_comment_added(&e.task_id, e.comment, &self.user.id)
                    .await
            }
            ServerEvent::CommentDeleted(e) => {
                tasks.apply_comment_deleted(&e.task_id, &e.comment_id).await
            }
            ServerEvent::ProjectCreated(project) => {
                let id = project.id.clone();
                let applied = projects.apply_created(project).await;
                if applied {
                    self.socket.join_project(&id).await;
                }
                applied
            }
            ServerEvent::ProjectUpdated(project) => projects.apply_updated(project).await,
            ServerEvent::ProjectDeleted(r) => self.drop_project(&r.project_id).await,
            ServerEvent::MemberAdded(e) => projects.apply_member_added(&e.project_id, e.member).await,
            ServerEvent::MemberRemoved(e) if e.user_id == self.user.id => {
                tracing::info!(project_id = %e.project_id, "removed from project");
                self.drop_project(&e.project_id).await
            }
            ServerEvent::MemberRemoved(e) => {
                projects.apply_member_removed(&e.project_id, &e.user_id).await
            }
            ServerEvent::ElementUpdated(element) => boards.apply_element_updated(element).await,
            ServerEvent::ElementDeleted(r) => {
                boards.apply_element_deleted(&r.board_id, &r.element_id).await
            }
        }
    }

    /// Forgets a project the user can no longer see, along with its tasks.
    async fn drop_project(&self, project_id: &str) -> bool {
        let removed = self.stores.projects.apply_deleted(project_id).await;
        let tasks = self.stores.tasks.apply_project_removed(project_id).await;
        self.socket.leave_project(project_id).await;
        removed || tasks > 0
    }
}

fn event_name(event: &ServerEvent) -> &'static str {
    match event {
        ServerEvent::TaskCreated(_) => "task:created",
        ServerEvent::TaskUpdated(_) => "task:updated",
        ServerEvent::TaskDeleted(_) => "task:deleted",
        ServerEvent::CommentAdded(_) => "task:comment_added",
        ServerEvent::CommentDeleted(_) => "task:comment_deleted",
        ServerEvent::ProjectCreated(_) => "project:created",
        ServerEvent::ProjectUpdated(_) => "project:updated",
        ServerEvent::ProjectDeleted(_) => "project:deleted",
        ServerEvent::MemberAdded(_) => "project:member_added",
        ServerEvent::MemberRemoved(_) => "project:member_removed",
        ServerEvent::ElementUpdated(_) => "board:element_updated",
        ServerEvent::ElementDeleted(_) => "board:element_deleted",
    }
}
