// Server-pushed events and the frame envelope they travel in.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{BoardElement, Comment, Project, ProjectMember, Task};

/// One text frame on the socket: `{"event": "...", "data": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

pub const JOIN_PROJECT: &str = "join_project";
pub const LEAVE_PROJECT: &str = "leave_project";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRef {
    #[serde(alias = "id")]
    pub task_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentAdded {
    pub task_id: String,
    pub comment: Comment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDeleted {
    pub task_id: String,
    pub comment_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRef {
    #[serde(alias = "id")]
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberAdded {
    pub project_id: String,
    pub member: ProjectMember,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRemoved {
    pub project_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementRef {
    pub board_id: String,
    pub element_id: String,
}

/// Every event the bridge applies to the stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "task:created")]
    TaskCreated(Task),
    #[serde(rename = "task:updated")]
    TaskUpdated(Task),
    #[serde(rename = "task:deleted")]
    TaskDeleted(TaskRef),
    #[serde(rename = "task:comment_added")]
    CommentAdded(CommentAdded),
    #[serde(rename = "task:comment_deleted")]
    CommentDeleted(CommentDeleted),
    #[serde(rename = "project:created")]
    ProjectCreated(Project),
    #[serde(rename = "project:updated")]
    ProjectUpdated(Project),
    #[serde(rename = "project:deleted")]
    ProjectDeleted(ProjectRef),
    #[serde(rename = "project:member_added")]
    MemberAdded(MemberAdded),
    #[serde(rename = "project:member_removed")]
    MemberRemoved(MemberRemoved),
    #[serde(rename = "board:element_updated")]
    ElementUpdated(BoardElement),
    #[serde(rename = "board:element_deleted")]
    ElementDeleted(ElementRef),
}

impl ServerEvent {
    pub const NAMES: [&'static str; 12] = [
        "task:created",
        "task:updated",
        "task:deleted",
        "task:comment_added",
        "task:comment_deleted",
        "project:created",
        "project:updated",
        "project:deleted",
        "project:member_added",
        "project:member_removed",
        "board:element_updated",
        "board:element_deleted",
    ];

    /// Decodes the payload of a named event.
    pub fn decode(event: &str, data: &Value) -> serde_json::Result<Self> {
        serde_json::from_value(serde_json::json!({ "event": event, "data": data }))
    }
}
