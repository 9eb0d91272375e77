use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use uuid::Uuid;

use super::collection::Collection;
use super::reconcile::supersedes;
use crate::api::TaskBackend;
use crate::error::{ApiError, Result};
use crate::models::{Comment, NewComment, NewTask, Task, TaskPatch, TaskStatus, User};
use crate::notify::{Notice, Notifier};

const TEMP_COMMENT_PREFIX: &str = "temp-";

pub struct TaskStore {
    backend: Arc<dyn TaskBackend>,
    tasks: Collection<Task>,
    notifier: Notifier,
}

impl TaskStore {
    pub fn new(backend: Arc<dyn TaskBackend>, notifier: Notifier, protection: Duration) -> Self {
        Self {
            backend,
            tasks: Collection::new(protection),
            notifier,
        }
    }

    pub async fn tasks(&self) -> Arc<Vec<Task>> {
        self.tasks.snapshot().await
    }

    pub async fn get(&self, id: &str) -> Option<Task> {
        self.tasks.get(id).await
    }

    pub async fn revision(&self) -> u64 {
        self.tasks.revision().await
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tasks.subscribe()
    }

    pub async fn for_project(&self, project_id: &str) -> Vec<Task> {
        self.tasks
            .snapshot()
            .await
            .iter()
            .filter(|t| t.project_id.as_deref() == Some(project_id))
            .cloned()
            .collect()
    }

    pub async fn personal(&self) -> Vec<Task> {
        self.tasks
            .snapshot()
            .await
            .iter()
            .filter(|t| t.is_personal())
            .cloned()
            .collect()
    }

    /// Groups tasks into Kanban columns, each sorted by its ordering key.
    pub async fn by_status(&self) -> BTreeMap<TaskStatus, Vec<Task>> {
        let mut columns: BTreeMap<TaskStatus, Vec<Task>> = BTreeMap::new();
        for task in self.tasks.snapshot().await.iter() {
            columns
                .entry(task.status.clone())
                .or_default()
                .push(task.clone());
        }
        for tasks in columns.values_mut() {
            tasks.sort_by(|a, b| {
                a.order
                    .unwrap_or(f64::MAX)
                    .total_cmp(&b.order.unwrap_or(f64::MAX))
            });
        }
        columns
    }

    /// Refetches every task. Failures are logged and the current collection
    /// is kept. Returns whether anything changed.
    pub async fn refresh(&self) -> bool {
        match self.backend.list_tasks().await {
            Ok(tasks) => self.tasks.reconcile(tasks).await,
            Err(err) => {
                tracing::warn!(error = %err, "failed to fetch tasks");
                false
            }
        }
    }

    pub async fn create(&self, task: NewTask) -> Result<Task> {
        if task.title.trim().is_empty() {
            let err = ApiError::Validation("Task title is required".to_string());
            self.notifier.error("create task", &err);
            return Err(err);
        }

        match self.backend.create_task(&task).await {
            Ok(created) => {
                tracing::debug!(task_id = %created.id, "task created");
                self.tasks.insert_created(created.clone()).await;
                self.notifier.notify(Notice::success("Task created"));
                Ok(created)
            }
            Err(err) => {
                self.notifier.error("create task", &err);
                Err(err)
            }
        }
    }

    pub async fn update(&self, id: &str, mut patch: TaskPatch) -> Result<Task> {
        let previous = self
            .tasks
            .patch(id, |task| patch.apply(task))
            .await
            .ok_or_else(|| ApiError::NotFound(format!("Task {id} not found")))?;

        if patch.version.is_none() {
            patch.version = previous.version;
        }

        match self.backend.update_task(id, &patch).await {
            Ok(updated) => {
                self.tasks.replace(updated.clone()).await;
                Ok(updated)
            }
            Err(err) => {
                tracing::warn!(task_id = id, "rolling back task update");
                self.tasks.restore(previous).await;
                self.notifier.error("update task", &err);
                Err(err)
            }
        }
    }

    /// Moves a task to another column (drag and drop between lanes).
    pub async fn move_to(&self, id: &str, status: TaskStatus, order: Option<f64>) -> Result<Task> {
        self.update(
            id,
            TaskPatch {
                status: Some(status),
                order,
                ..Default::default()
            },
        )
        .await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let (index, previous) = self
            .tasks
            .remove(id)
            .await
            .ok_or_else(|| ApiError::NotFound(format!("Task {id} not found")))?;

        match self.backend.delete_task(id).await {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::warn!(task_id = id, "rolling back task delete");
                self.tasks.reinsert(index, previous).await;
                self.notifier.error("delete task", &err);
                Err(err)
            }
        }
    }

    /// Adds a comment authored by `author`. A temporary copy is shown until
    /// the server answers.
    pub async fn add_comment(
        &self,
        task_id: &str,
        comment: NewComment,
        author: &User,
    ) -> Result<Comment> {
        if comment.text.trim().is_empty() {
            let err = ApiError::Validation("Comment text is required".to_string());
            self.notifier.error("add comment", &err);
            return Err(err);
        }

        let temp_id = format!("{TEMP_COMMENT_PREFIX}{}", Uuid::new_v4());
        let pending = Comment {
            id: temp_id.clone(),
            text: comment.text.clone(),
            created_by: author.id.clone(),
            created_by_name: Some(author.name.clone()),
            created_at: Utc::now().to_rfc3339(),
            mentions: comment.mentions.clone(),
        };
        self.tasks
            .patch(task_id, |task| task.comments.push(pending))
            .await
            .ok_or_else(|| ApiError::NotFound(format!("Task {task_id} not found")))?;

        match self.backend.add_comment(task_id, &comment).await {
            Ok(saved) => {
                let confirmed = saved.clone();
                self.tasks
                    .patch(task_id, |task| {
                        task.comments.retain(|c| c.id != temp_id);
                        if !task.comments.iter().any(|c| c.id == confirmed.id) {
                            task.comments.push(confirmed);
                        }
                    })
                    .await;
                Ok(saved)
            }
            Err(err) => {
                self.tasks
                    .patch(task_id, |task| task.comments.retain(|c| c.id != temp_id))
                    .await;
                self.notifier.error("add comment", &err);
                Err(err)
            }
        }
    }

    pub async fn delete_comment(&self, task_id: &str, comment_id: &str) -> Result<()> {
        let mut removed: Option<(usize, Comment)> = None;
        self.tasks
            .patch(task_id, |task| {
                if let Some(index) = task.comments.iter().position(|c| c.id == comment_id) {
                    removed = Some((index, task.comments.remove(index)));
                }
            })
            .await
            .ok_or_else(|| ApiError::NotFound(format!("Task {task_id} not found")))?;

        let Some((index, comment)) = removed else {
            return Err(ApiError::NotFound(format!("Comment {comment_id} not found")));
        };

        match self.backend.delete_comment(task_id, comment_id).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.tasks
                    .patch(task_id, |task| {
                        if !task.comments.iter().any(|c| c.id == comment.id) {
                            let index = index.min(task.comments.len());
                            task.comments.insert(index, comment);
                        }
                    })
                    .await;
                self.notifier.error("delete comment", &err);
                Err(err)
            }
        }
    }

    // ── Push-path mutations ──────────────────────────────────────────

    pub async fn apply_created(&self, task: Task) -> bool {
        self.tasks.insert_if_absent(task).await
    }

    /// Applies a pushed update if it is newer than the held copy. Unknown
    /// tasks (e.g. newly shared ones) are inserted.
    pub async fn apply_updated(&self, task: Task) -> bool {
        if let Some(existing) = self.tasks.get(&task.id).await {
            if !supersedes(&task, &existing) {
                return false;
            }
        }
        self.tasks.upsert(task).await;
        true
    }

    pub async fn apply_deleted(&self, task_id: &str) -> bool {
        self.tasks.remove(task_id).await.is_some()
    }

    /// Applies a pushed comment. Comments written by `current_user_id` are
    /// dropped: the local optimistic insert already shows them.
    pub async fn apply_comment_added(
        &self,
        task_id: &str,
        comment: Comment,
        current_user_id: &str,
    ) -> bool {
        if comment.created_by == current_user_id {
            tracing::debug!(task_id, comment_id = %comment.id, "ignoring own comment echo");
            return false;
        }
        let Some(task) = self.tasks.get(task_id).await else {
            return false;
        };
        if task.comments.iter().any(|c| c.id == comment.id) {
            return false;
        }
        self.tasks
            .patch(task_id, |task| task.comments.push(comment))
            .await
            .is_some()
    }

    pub async fn apply_comment_deleted(&self, task_id: &str, comment_id: &str) -> bool {
        let Some(task) = self.tasks.get(task_id).await else {
            return false;
        };
        if !task.comments.iter().any(|c| c.id == comment_id) {
            return false;
        }
        self.tasks
            .patch(task_id, |task| task.comments.retain(|c| c.id != comment_id))
            .await
            .is_some()
    }

    /// Drops every task of a project the user can no longer see.
    pub async fn apply_project_removed(&self, project_id: &str) -> usize {
        let ids: Vec<String> = self
            .for_project(project_id)
            .await
            .into_iter()
            .map(|t| t.id)
            .collect();
        for id in &ids {
            self.tasks.remove(id).await;
        }
        ids.len()
    }

    pub async fn clear(&self) {
        self.tasks.clear().await;
    }
}
