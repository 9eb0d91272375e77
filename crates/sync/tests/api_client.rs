//! REST client behaviour against a local axum fixture server.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    routing::{get, put},
    Json, Router,
};
use serde_json::{json, Value};

use taskdeck_sync::api::{ProjectBackend, TaskBackend};
use taskdeck_sync::models::TaskPatch;
use taskdeck_sync::notify::{NoticeLevel, Notifier};
use taskdeck_sync::store::TaskStore;
use taskdeck_sync::{ApiClient, ErrorKind};

const TOKEN: &str = "test-token";

fn task_json(id: &str, updated_at: &str) -> Value {
    json!({
        "id": id,
        "title": format!("Task {id}"),
        "status": "todo",
        "userId": "u1",
        "createdAt": "2024-01-01T00:00:00Z",
        "updatedAt": updated_at,
    })
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"))
}

async fn list_tasks(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "No token provided" })),
        );
    }
    (
        StatusCode::OK,
        Json(json!([task_json("t1", "t0"), task_json("t2", "t0")])),
    )
}

async fn update_task(Path(_id): Path<String>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "error": "Only editors can update tasks" })),
    )
}

async fn serve() -> ApiClient {
    let app = Router::new()
        .route("/api/tasks", get(list_tasks))
        .route("/api/tasks/:id", put(update_task))
        .route(
            "/api/projects",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "database is down") }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    ApiClient::new(format!("http://{addr}/"))
}

#[tokio::test]
async fn bearer_token_is_sent() {
    let client = serve().await;

    let err = client.list_tasks().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(err.message(), "No token provided");

    client.set_token(TOKEN).await;
    let tasks = client.list_tasks().await.unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].id, "t1");
}

#[tokio::test]
async fn plain_text_error_bodies_are_kept() {
    let client = serve().await;
    let err = client.list_projects().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Server);
    assert_eq!(err.message(), "database is down");
    assert!(err.is_transient());
}

#[tokio::test]
async fn forbidden_update_rolls_back_and_notifies() {
    let client = serve().await;
    client.set_token(TOKEN).await;

    let notifier = Notifier::new();
    let mut notices = notifier.subscribe();
    let store = TaskStore::new(Arc::new(client), notifier, Duration::from_secs(10));
    assert!(store.refresh().await);
    let before = store.tasks().await;

    let err = store
        .update(
            "t1",
            TaskPatch {
                title: Some("renamed".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert_eq!(*store.tasks().await, *before);

    let notice = notices.recv().await.unwrap();
    assert_eq!(notice.level, NoticeLevel::Error);
    assert_eq!(notice.kind, Some(ErrorKind::Forbidden));
}
