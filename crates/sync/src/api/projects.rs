use async_trait::async_trait;
use reqwest::Method;

use super::{segment, ApiClient, ProjectBackend};
use crate::error::Result;
use crate::models::{AddMemberRequest, Invitation, NewProject, Project, ProjectPatch};

#[async_trait]
impl ProjectBackend for ApiClient {
    async fn list_projects(&self) -> Result<Vec<Project>> {
        self.get("/api/projects").await
    }

    async fn create_project(&self, project: &NewProject) -> Result<Project> {
        self.send_json(Method::POST, "/api/projects", project).await
    }

    async fn update_project(&self, id: &str, patch: &ProjectPatch) -> Result<Project> {
        let path = format!("/api/projects/{}", segment(id));
        self.send_json(Method::PUT, &path, patch).await
    }

    async fn delete_project(&self, id: &str) -> Result<()> {
        self.delete(&format!("/api/projects/{}", segment(id))).await
    }

    async fn archive_project(&self, id: &str) -> Result<Project> {
        self.post_empty(&format!("/api/projects/{}/archive", segment(id)))
            .await
    }

    async fn unarchive_project(&self, id: &str) -> Result<Project> {
        self.post_empty(&format!("/api/projects/{}/unarchive", segment(id)))
            .await
    }

    async fn add_member(&self, project_id: &str, member: &AddMemberRequest) -> Result<Project> {
        let path = format!("/api/projects/{}/members", segment(project_id));
        self.send_json(Method::POST, &path, member).await
    }

    async fn remove_member(&self, project_id: &str, user_id: &str) -> Result<Project> {
        let path = format!(
            "/api/projects/{}/members/{}",
            segment(project_id),
            segment(user_id)
        );
        // The server answers with the updated project.
        self.send_json(Method::DELETE, &path, &serde_json::json!({}))
            .await
    }

    async fn list_invitations(&self) -> Result<Vec<Invitation>> {
        self.get("/api/invitations").await
    }

    async fn accept_invitation(&self, id: &str) -> Result<Project> {
        self.post_empty(&format!("/api/invitations/{}/accept", segment(id)))
            .await
    }

    async fn decline_invitation(&self, id: &str) -> Result<()> {
        self.post_unit(&format!("/api/invitations/{}/decline", segment(id)))
            .await
    }
}
