//! REST transport: a bearer-token HTTP client plus the backend traits the
//! stores are written against.

pub mod auth;
pub mod boards;
pub mod projects;
pub mod tasks;

use std::sync::Arc;

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{ApiError, Result};
use crate::models::{
    AddMemberRequest, AuthResponse, Board, BoardElement, Comment, ElementPatch, Invitation,
    NewBoard, NewComment, NewElement, NewProject, NewTask, Project, ProjectPatch, Task, TaskPatch,
    User, UserSettings,
};

#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Installs (or clears) the bearer token used for subsequent calls.
    async fn use_token(&self, token: Option<&str>);
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse>;
    async fn register(&self, email: &str, name: &str, password: &str) -> Result<AuthResponse>;
    async fn me(&self) -> Result<User>;
    async fn settings(&self) -> Result<UserSettings>;
    async fn update_settings(&self, settings: &UserSettings) -> Result<UserSettings>;
}

#[async_trait]
pub trait TaskBackend: Send + Sync {
    async fn list_tasks(&self) -> Result<Vec<Task>>;
    async fn create_task(&self, task: &NewTask) -> Result<Task>;
    async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Task>;
    async fn delete_task(&self, id: &str) -> Result<()>;
    async fn add_comment(&self, task_id: &str, comment: &NewComment) -> Result<Comment>;
    async fn delete_comment(&self, task_id: &str, comment_id: &str) -> Result<()>;
}

#[async_trait]
pub trait ProjectBackend: Send + Sync {
    async fn list_projects(&self) -> Result<Vec<Project>>;
    async fn create_project(&self, project: &NewProject) -> Result<Project>;
    async fn update_project(&self, id: &str, patch: &ProjectPatch) -> Result<Project>;
    async fn delete_project(&self, id: &str) -> Result<()>;
    async fn archive_project(&self, id: &str) -> Result<Project>;
    async fn unarchive_project(&self, id: &str) -> Result<Project>;
    async fn add_member(&self, project_id: &str, member: &AddMemberRequest) -> Result<Project>;
    async fn remove_member(&self, project_id: &str, user_id: &str) -> Result<Project>;
    async fn list_invitations(&self) -> Result<Vec<Invitation>>;
    async fn accept_invitation(&self, id: &str) -> Result<Project>;
    async fn decline_invitation(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait BoardBackend: Send + Sync {
    async fn list_boards(&self) -> Result<Vec<Board>>;
    async fn create_board(&self, board: &NewBoard) -> Result<Board>;
    async fn get_board(&self, id: &str) -> Result<Board>;
    async fn delete_board(&self, id: &str) -> Result<()>;
    async fn create_element(&self, board_id: &str, element: &NewElement) -> Result<BoardElement>;
    async fn update_element(
        &self,
        board_id: &str,
        element_id: &str,
        patch: &ElementPatch,
    ) -> Result<BoardElement>;
    async fn delete_element(&self, board_id: &str, element_id: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// HTTP client for the `/api` surface. Cloning shares the token slot.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Arc<RwLock<Option<String>>>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: Arc::new(RwLock::new(None)),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn set_token(&self, token: impl Into<String>) {
        *self.token.write().await = Some(token.into());
    }

    pub async fn clear_token(&self) {
        *self.token.write().await = None;
    }

    pub async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    async fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.base_url, path));
        match self.token.read().await.as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.request(Method::GET, path).await.send().await?;
        decode(response).await
    }

    pub(crate) async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = self.request(method, path).await.json(body).send().await?;
        decode(response).await
    }

    pub(crate) async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.request(Method::POST, path).await.send().await?;
        decode(response).await
    }

    pub(crate) async fn post_unit(&self, path: &str) -> Result<()> {
        let response = self.request(Method::POST, path).await.send().await?;
        check(response).await.map(|_| ())
    }

    pub(crate) async fn delete(&self, path: &str) -> Result<()> {
        let response = self.request(Method::DELETE, path).await.send().await?;
        check(response).await.map(|_| ())
    }
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.error.or(body.message))
        .filter(|m| !m.is_empty())
        .or_else(|| (!text.is_empty()).then(|| text.clone()))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        });

    Err(ApiError::from_status(status.as_u16(), message))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let response = check(response).await?;
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Everything but RFC 3986 unreserved characters.
const SEGMENT_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Escapes an id for use as a single path segment or query value.
pub(crate) fn segment(id: &str) -> String {
    utf8_percent_encode(id, SEGMENT_SET).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let client = ApiClient::new("http://localhost:3000/");
        assert_eq!(client.base_url(), "http://localhost:3000");
    }

    #[test]
    fn segments_are_escaped() {
        assert_eq!(segment("abc-123"), "abc-123");
        assert_eq!(segment("a/b c"), "a%2Fb%20c");
        assert_eq!(segment("caf\u{e9}?x=1"), "caf%C3%A9%3Fx%3D1");
    }

    #[tokio::test]
    async fn token_slot_is_shared_between_clones() {
        let client = ApiClient::new("http://localhost");
        let clone = client.clone();
        client.set_token("abc").await;
        assert_eq!(clone.token().await.as_deref(), Some("abc"));
        clone.clear_token().await;
        assert!(client.token().await.is_none());
    }
}
