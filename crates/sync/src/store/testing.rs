//! In-memory backends for store tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use uuid::Uuid;

use super::auth::Claims;
use crate::api::{AuthBackend, BoardBackend, ProjectBackend, TaskBackend};
use crate::error::{ApiError, Result};
use crate::models::fixtures::{element, project, task, user};
use crate::models::{
    AddMemberRequest, AuthResponse, Board, BoardElement, Comment, ElementPatch, Invitation,
    NewBoard, NewComment, NewElement, NewProject, NewTask, Project, ProjectMember, ProjectPatch,
    Role, Task, TaskPatch, User, UserSettings,
};

/// Call counter plus a one-shot injected failure.
#[derive(Default)]
struct Faults {
    calls: AtomicUsize,
    next: Mutex<Option<ApiError>>,
}

impl Faults {
    fn hit(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.next.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn fail_next(&self, err: ApiError) {
        *self.next.lock().unwrap() = Some(err);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn token_for(user_id: &str, ttl_secs: i64) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        email: format!("{user_id}@example.com"),
        name: user_id.to_uppercase(),
        exp: (Utc::now().timestamp() + ttl_secs) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(b"test")).unwrap()
}

pub fn invitation(id: &str, project_id: &str) -> Invitation {
    Invitation {
        id: id.to_string(),
        project_id: project_id.to_string(),
        project_name: Some(format!("Project {project_id}")),
        invited_by: Some("owner".to_string()),
        email: "me@example.com".to_string(),
        role: Role::Editor,
        created_at: "2024-01-01T00:00:00Z".to_string(),
    }
}

// ── Tasks ────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockTasks {
    list: Mutex<Vec<Task>>,
    faults: Faults,
}

impl MockTasks {
    pub fn with(list: Vec<Task>) -> Self {
        Self {
            list: Mutex::new(list),
            faults: Faults::default(),
        }
    }

    pub fn set_list(&self, list: Vec<Task>) {
        *self.list.lock().unwrap() = list;
    }

    pub fn fail_next(&self, err: ApiError) {
        self.faults.fail_next(err);
    }

    pub fn calls(&self) -> usize {
        self.faults.calls()
    }
}

#[async_trait]
impl TaskBackend for MockTasks {
    async fn list_tasks(&self) -> Result<Vec<Task>> {
        self.faults.hit()?;
        Ok(self.list.lock().unwrap().clone())
    }

    async fn create_task(&self, new: &NewTask) -> Result<Task> {
        self.faults.hit()?;
        let mut created = task(&Uuid::new_v4().to_string(), "server");
        created.title = new.title.clone();
        created.project_id = new.project_id.clone();
        if let Some(status) = &new.status {
            created.status = status.clone();
        }
        self.list.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Task> {
        self.faults.hit()?;
        let mut list = self.list.lock().unwrap();
        let existing = list
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| ApiError::NotFound("Task not found".into()))?;
        patch.apply(existing);
        existing.updated_at = "server".to_string();
        Ok(existing.clone())
    }

    async fn delete_task(&self, id: &str) -> Result<()> {
        self.faults.hit()?;
        self.list.lock().unwrap().retain(|t| t.id != id);
        Ok(())
    }

    async fn add_comment(&self, _task_id: &str, comment: &NewComment) -> Result<Comment> {
        self.faults.hit()?;
        Ok(Comment {
            id: format!("c-{}", Uuid::new_v4()),
            text: comment.text.clone(),
            created_by: "u1".to_string(),
            created_by_name: Some("U1".to_string()),
            created_at: Utc::now().to_rfc3339(),
            mentions: comment.mentions.clone(),
        })
    }

    async fn delete_comment(&self, _task_id: &str, _comment_id: &str) -> Result<()> {
        self.faults.hit()
    }
}

// ── Projects ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockProjects {
    list: Mutex<Vec<Project>>,
    invitations: Mutex<Vec<Invitation>>,
    faults: Faults,
}

impl MockProjects {
    pub fn with(list: Vec<Project>) -> Self {
        Self {
            list: Mutex::new(list),
            ..Default::default()
        }
    }

    pub fn set_invitations(&self, invitations: Vec<Invitation>) {
        *self.invitations.lock().unwrap() = invitations;
    }

    pub fn fail_next(&self, err: ApiError) {
        self.faults.fail_next(err);
    }

    pub fn calls(&self) -> usize {
        self.faults.calls()
    }

    fn modify(&self, id: &str, f: impl FnOnce(&mut Project)) -> Result<Project> {
        let mut list = self.list.lock().unwrap();
        let existing = list
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| ApiError::NotFound("Project not found".into()))?;
        f(existing);
        existing.updated_at = "server".to_string();
        Ok(existing.clone())
    }
}

#[async_trait]
impl ProjectBackend for MockProjects {
    async fn list_projects(&self) -> Result<Vec<Project>> {
        self.faults.hit()?;
        Ok(self.list.lock().unwrap().clone())
    }

    async fn create_project(&self, new: &NewProject) -> Result<Project> {
        self.faults.hit()?;
        let mut created = project(&Uuid::new_v4().to_string(), "u1");
        created.name = new.name.clone();
        self.list.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn update_project(&self, id: &str, patch: &ProjectPatch) -> Result<Project> {
        self.faults.hit()?;
        self.modify(id, |p| patch.apply(p))
    }

    async fn delete_project(&self, id: &str) -> Result<()> {
        self.faults.hit()?;
        self.list.lock().unwrap().retain(|p| p.id != id);
        Ok(())
    }

    async fn archive_project(&self, id: &str) -> Result<Project> {
        self.faults.hit()?;
        self.modify(id, |p| {
            p.archived = true;
            p.archived_at = Some(Utc::now().to_rfc3339());
        })
    }

    async fn unarchive_project(&self, id: &str) -> Result<Project> {
        self.faults.hit()?;
        self.modify(id, |p| {
            p.archived = false;
            p.archived_at = None;
        })
    }

    async fn add_member(&self, project_id: &str, member: &AddMemberRequest) -> Result<Project> {
        self.faults.hit()?;
        self.modify(project_id, |p| {
            p.members.push(ProjectMember {
                id: None,
                user_id: Some(Uuid::new_v4().to_string()),
                email: Some(member.email.clone()),
                name: None,
                role: member.role,
            })
        })
    }

    async fn remove_member(&self, project_id: &str, user_id: &str) -> Result<Project> {
        self.faults.hit()?;
        self.modify(project_id, |p| {
            p.members.retain(|m| m.user_id.as_deref() != Some(user_id))
        })
    }

    async fn list_invitations(&self) -> Result<Vec<Invitation>> {
        self.faults.hit()?;
        Ok(self.invitations.lock().unwrap().clone())
    }

    async fn accept_invitation(&self, id: &str) -> Result<Project> {
        self.faults.hit()?;
        let mut invitations = self.invitations.lock().unwrap();
        let index = invitations
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| ApiError::NotFound("Invitation not found".into()))?;
        let accepted = invitations.remove(index);
        Ok(project(&accepted.project_id, "owner"))
    }

    async fn decline_invitation(&self, id: &str) -> Result<()> {
        self.faults.hit()?;
        self.invitations.lock().unwrap().retain(|i| i.id != id);
        Ok(())
    }
}

// ── Boards ───────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockBoards {
    elements: Mutex<Vec<BoardElement>>,
    faults: Faults,
}

impl MockBoards {
    pub fn with_elements(elements: Vec<BoardElement>) -> Self {
        Self {
            elements: Mutex::new(elements),
            faults: Faults::default(),
        }
    }

    pub fn fail_next(&self, err: ApiError) {
        self.faults.fail_next(err);
    }

    pub fn calls(&self) -> usize {
        self.faults.calls()
    }

    fn board(&self, id: &str, with_elements: bool) -> Board {
        Board {
            id: id.to_string(),
            name: format!("Board {id}"),
            owner_id: "u1".to_string(),
            elements: if with_elements {
                self.elements.lock().unwrap().clone()
            } else {
                vec![]
            },
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
            version: None,
        }
    }
}

#[async_trait]
impl BoardBackend for MockBoards {
    async fn list_boards(&self) -> Result<Vec<Board>> {
        self.faults.hit()?;
        Ok(vec![self.board("b1", false)])
    }

    async fn create_board(&self, new: &NewBoard) -> Result<Board> {
        self.faults.hit()?;
        let mut board = self.board(&Uuid::new_v4().to_string(), false);
        board.name = new.name.clone();
        Ok(board)
    }

    async fn get_board(&self, id: &str) -> Result<Board> {
        self.faults.hit()?;
        Ok(self.board(id, true))
    }

    async fn delete_board(&self, _id: &str) -> Result<()> {
        self.faults.hit()
    }

    async fn create_element(&self, board_id: &str, new: &NewElement) -> Result<BoardElement> {
        self.faults.hit()?;
        let mut created = element(&Uuid::new_v4().to_string(), new.position_x, new.position_y, 0);
        created.board_id = board_id.to_string();
        created.kind = new.kind;
        created.width = new.width;
        created.height = new.height;
        created.content = new.content.clone();
        self.elements.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn update_element(
        &self,
        _board_id: &str,
        element_id: &str,
        patch: &ElementPatch,
    ) -> Result<BoardElement> {
        self.faults.hit()?;
        let mut elements = self.elements.lock().unwrap();
        let existing = elements
            .iter_mut()
            .find(|e| e.id == element_id)
            .ok_or_else(|| ApiError::NotFound("Element not found".into()))?;
        patch.apply(existing);
        existing.updated_at = "server".to_string();
        Ok(existing.clone())
    }

    async fn delete_element(&self, _board_id: &str, element_id: &str) -> Result<()> {
        self.faults.hit()?;
        self.elements.lock().unwrap().retain(|e| e.id != element_id);
        Ok(())
    }
}

// ── Auth ─────────────────────────────────────────────────────────────

pub struct MockAuth {
    user: User,
    token: Mutex<Option<String>>,
    settings: Mutex<UserSettings>,
    faults: Faults,
}

impl MockAuth {
    pub fn new(user_id: &str) -> Self {
        Self {
            user: user(user_id, &format!("{user_id}@example.com")),
            token: Mutex::new(None),
            settings: Mutex::new(UserSettings::default()),
            faults: Faults::default(),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    pub fn set_settings(&self, settings: UserSettings) {
        *self.settings.lock().unwrap() = settings;
    }

    pub fn fail_next(&self, err: ApiError) {
        self.faults.fail_next(err);
    }

    pub fn calls(&self) -> usize {
        self.faults.calls()
    }

    fn respond(&self) -> AuthResponse {
        AuthResponse {
            token: token_for(&self.user.id, 3600),
            user: self.user.clone(),
        }
    }
}

#[async_trait]
impl AuthBackend for MockAuth {
    async fn use_token(&self, token: Option<&str>) {
        *self.token.lock().unwrap() = token.map(str::to_string);
    }

    async fn login(&self, _email: &str, _password: &str) -> Result<AuthResponse> {
        self.faults.hit()?;
        Ok(self.respond())
    }

    async fn register(&self, _email: &str, _name: &str, _password: &str) -> Result<AuthResponse> {
        self.faults.hit()?;
        Ok(self.respond())
    }

    async fn me(&self) -> Result<User> {
        self.faults.hit()?;
        if self.token.lock().unwrap().is_none() {
            return Err(ApiError::Unauthorized("No token provided".into()));
        }
        Ok(self.user.clone())
    }

    async fn settings(&self) -> Result<UserSettings> {
        self.faults.hit()?;
        Ok(self.settings.lock().unwrap().clone())
    }

    async fn update_settings(&self, settings: &UserSettings) -> Result<UserSettings> {
        self.faults.hit()?;
        *self.settings.lock().unwrap() = settings.clone();
        Ok(settings.clone())
    }
}
