use async_trait::async_trait;
use reqwest::Method;

use super::{segment, ApiClient, TaskBackend};
use crate::error::Result;
use crate::models::{Comment, NewComment, NewTask, Task, TaskPatch};

#[async_trait]
impl TaskBackend for ApiClient {
    async fn list_tasks(&self) -> Result<Vec<Task>> {
        self.get("/api/tasks").await
    }

    async fn create_task(&self, task: &NewTask) -> Result<Task> {
        self.send_json(Method::POST, "/api/tasks", task).await
    }

    async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Task> {
        let path = format!("/api/tasks/{}", segment(id));
        self.send_json(Method::PUT, &path, patch).await
    }

    async fn delete_task(&self, id: &str) -> Result<()> {
        self.delete(&format!("/api/tasks/{}", segment(id))).await
    }

    async fn add_comment(&self, task_id: &str, comment: &NewComment) -> Result<Comment> {
        let path = format!("/api/tasks/{}/comments", segment(task_id));
        self.send_json(Method::POST, &path, comment).await
    }

    async fn delete_comment(&self, task_id: &str, comment_id: &str) -> Result<()> {
        self.delete(&format!(
            "/api/tasks/{}/comments/{}",
            segment(task_id),
            segment(comment_id)
        ))
        .await
    }
}
