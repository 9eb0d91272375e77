use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, RwLock};

use super::collection::Collection;
use super::reconcile::supersedes;
use crate::api::ProjectBackend;
use crate::error::{ApiError, Result};
use crate::models::{
    AddMemberRequest, Invitation, NewProject, Project, ProjectMember, ProjectPatch, Role, User,
};
use crate::notify::{Notice, Notifier};

/// Resolves `user`'s role in `project`.
///
/// Ownership is checked first, then the member list is scanned by user id,
/// member id, or email. The first match wins; no match means [`Role::Viewer`].
pub fn member_role(project: &Project, user: &User) -> Role {
    if project.owner_id == user.id {
        return Role::Owner;
    }
    project
        .members
        .iter()
        .find(|member| member.matches(user))
        .map(|member| member.role)
        .unwrap_or(Role::Viewer)
}

fn is_member_id(member: &ProjectMember, user_id: &str) -> bool {
    member.user_id.as_deref() == Some(user_id) || member.id.as_deref() == Some(user_id)
}

pub struct ProjectStore {
    backend: Arc<dyn ProjectBackend>,
    projects: Collection<Project>,
    invitations: RwLock<Vec<Invitation>>,
    notifier: Notifier,
}

impl ProjectStore {
    pub fn new(backend: Arc<dyn ProjectBackend>, notifier: Notifier, protection: Duration) -> Self {
        Self {
            backend,
            projects: Collection::new(protection),
            invitations: RwLock::new(Vec::new()),
            notifier,
        }
    }

    pub async fn projects(&self) -> Arc<Vec<Project>> {
        self.projects.snapshot().await
    }

    pub async fn active(&self) -> Vec<Project> {
        self.projects
            .snapshot()
            .await
            .iter()
            .filter(|p| !p.archived)
            .cloned()
            .collect()
    }

    pub async fn archived(&self) -> Vec<Project> {
        self.projects
            .snapshot()
            .await
            .iter()
            .filter(|p| p.archived)
            .cloned()
            .collect()
    }

    pub async fn get(&self, id: &str) -> Option<Project> {
        self.projects.get(id).await
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.projects.subscribe()
    }

    pub async fn role_of(&self, project_id: &str, user: &User) -> Option<Role> {
        self.projects
            .get(project_id)
            .await
            .map(|project| member_role(&project, user))
    }

    pub async fn refresh(&self) -> bool {
        match self.backend.list_projects().await {
            Ok(projects) => self.projects.reconcile(projects).await,
            Err(err) => {
                tracing::warn!(error = %err, "failed to fetch projects");
                false
            }
        }
    }

    pub async fn create(&self, project: NewProject) -> Result<Project> {
        if project.name.trim().is_empty() {
            let err = ApiError::Validation("Project name is required".to_string());
            self.notifier.error("create project", &err);
            return Err(err);
        }

        match self.backend.create_project(&project).await {
            Ok(created) => {
                self.projects.insert_created(created.clone()).await;
                self.notifier.notify(Notice::success("Project created"));
                Ok(created)
            }
            Err(err) => {
                self.notifier.error("create project", &err);
                Err(err)
            }
        }
    }

    pub async fn update(&self, id: &str, mut patch: ProjectPatch) -> Result<Project> {
        let previous = self
            .projects
            .patch(id, |project| patch.apply(project))
            .await
            .ok_or_else(|| ApiError::NotFound(format!("Project {id} not found")))?;

        if patch.version.is_none() {
            patch.version = previous.version;
        }

        match self.backend.update_project(id, &patch).await {
            Ok(updated) => {
                self.projects.replace(updated.clone()).await;
                Ok(updated)
            }
            Err(err) => {
                tracing::warn!(project_id = id, "rolling back project update");
                self.projects.restore(previous).await;
                self.notifier.error("update project", &err);
                Err(err)
            }
        }
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let (index, previous) = self
            .projects
            .remove(id)
            .await
            .ok_or_else(|| ApiError::NotFound(format!("Project {id} not found")))?;

        match self.backend.delete_project(id).await {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::warn!(project_id = id, "rolling back project delete");
                self.projects.reinsert(index, previous).await;
                self.notifier.error("delete project", &err);
                Err(err)
            }
        }
    }

    pub async fn archive(&self, id: &str) -> Result<Project> {
        self.set_archived(id, true).await
    }

    pub async fn unarchive(&self, id: &str) -> Result<Project> {
        self.set_archived(id, false).await
    }

    async fn set_archived(&self, id: &str, archived: bool) -> Result<Project> {
        let previous = self
            .projects
            .patch(id, |project| {
                project.archived = archived;
                project.archived_at = archived.then(|| Utc::now().to_rfc3339());
            })
            .await
            .ok_or_else(|| ApiError::NotFound(format!("Project {id} not found")))?;

        let result = if archived {
            self.backend.archive_project(id).await
        } else {
            self.backend.unarchive_project(id).await
        };

        match result {
            Ok(updated) => {
                self.projects.replace(updated.clone()).await;
                Ok(updated)
            }
            Err(err) => {
                self.projects.restore(previous).await;
                let action = if archived { "archive project" } else { "unarchive project" };
                self.notifier.error(action, &err);
                Err(err)
            }
        }
    }

    /// Invites a user by email. Not optimistic: the server resolves the user.
    pub async fn add_member(&self, project_id: &str, email: &str, role: Role) -> Result<Project> {
        if !email.contains('@') {
            let err = ApiError::Validation("A valid email address is required".to_string());
            self.notifier.error("add member", &err);
            return Err(err);
        }
        if role == Role::Owner {
            let err = ApiError::Validation("A project can only have one owner".to_string());
            self.notifier.error("add member", &err);
            return Err(err);
        }

        let request = AddMemberRequest {
            email: email.to_string(),
            role,
        };
        match self.backend.add_member(project_id, &request).await {
            Ok(updated) => {
                self.projects.upsert(updated.clone()).await;
                self.notifier.notify(Notice::success(format!("Invited {email}")));
                Ok(updated)
            }
            Err(err) => {
                self.notifier.error("add member", &err);
                Err(err)
            }
        }
    }

    pub async fn remove_member(&self, project_id: &str, user_id: &str) -> Result<Project> {
        let previous = self
            .projects
            .patch(project_id, |project| {
                project.members.retain(|m| !is_member_id(m, user_id));
            })
            .await
            .ok_or_else(|| ApiError::NotFound(format!("Project {project_id} not found")))?;

        match self.backend.remove_member(project_id, user_id).await {
            Ok(updated) => {
                self.projects.replace(updated.clone()).await;
                Ok(updated)
            }
            Err(err) => {
                self.projects.restore(previous).await;
                self.notifier.error("remove member", &err);
                Err(err)
            }
        }
    }

    // ── Invitations ──────────────────────────────────────────────────

    pub async fn invitations(&self) -> Vec<Invitation> {
        self.invitations.read().await.clone()
    }

    pub async fn refresh_invitations(&self) -> bool {
        match self.backend.list_invitations().await {
            Ok(list) => {
                let mut invitations = self.invitations.write().await;
                let changed = *invitations != list;
                *invitations = list;
                changed
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to fetch invitations");
                false
            }
        }
    }

    pub async fn accept_invitation(&self, id: &str) -> Result<Project> {
        match self.backend.accept_invitation(id).await {
            Ok(project) => {
                self.invitations.write().await.retain(|i| i.id != id);
                self.projects.insert_created(project.clone()).await;
                self.notifier
                    .notify(Notice::success(format!("Joined {}", project.name)));
                Ok(project)
            }
            Err(err) => {
                self.notifier.error("accept invitation", &err);
                Err(err)
            }
        }
    }

    pub async fn decline_invitation(&self, id: &str) -> Result<()> {
        let removed = {
            let mut invitations = self.invitations.write().await;
            let index = invitations.iter().position(|i| i.id == id);
            index.map(|index| (index, invitations.remove(index)))
        };

        match self.backend.decline_invitation(id).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if let Some((index, invitation)) = removed {
                    let mut invitations = self.invitations.write().await;
                    let index = index.min(invitations.len());
                    invitations.insert(index, invitation);
                }
                self.notifier.error("decline invitation", &err);
                Err(err)
            }
        }
    }

    // ── Push-path mutations ──────────────────────────────────────────

    pub async fn apply_created(&self, project: Project) -> bool {
        self.projects.insert_if_absent(project).await
    }

    pub async fn apply_updated(&self, project: Project) -> bool {
        if let Some(existing) = self.projects.get(&project.id).await {
            if !supersedes(&project, &existing) {
                return false;
            }
        }
        self.projects.upsert(project).await;
        true
    }

    pub async fn apply_deleted(&self, project_id: &str) -> bool {
        self.projects.remove(project_id).await.is_some()
    }

    pub async fn apply_member_added(&self, project_id: &str, member: ProjectMember) -> bool {
        let Some(project) = self.projects.get(project_id).await else {
            return false;
        };
        let key = member.user_id.as_deref().or(member.id.as_deref());
        let duplicate = project.members.iter().any(|m| match key {
            Some(key) => is_member_id(m, key),
            None => m.email.is_some() && m.email == member.email,
        });
        if duplicate {
            return false;
        }
        self.projects
            .patch(project_id, |project| project.members.push(member))
            .await
            .is_some()
    }

    pub async fn apply_member_removed(&self, project_id: &str, user_id: &str) -> bool {
        let Some(project) = self.projects.get(project_id).await else {
            return false;
        };
        if !project.members.iter().any(|m| is_member_id(m, user_id)) {
            return false;
        }
        self.projects
            .patch(project_id, |project| {
                project.members.retain(|m| !is_member_id(m, user_id))
            })
            .await
            .is_some()
    }

    pub async fn clear(&self) {
        self.projects.clear().await;
        self.invitations.write().await.clear();
    }
}
