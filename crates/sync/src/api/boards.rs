use async_trait::async_trait;
use reqwest::Method;

use super::{segment, ApiClient, BoardBackend};
use crate::error::Result;
use crate::models::{Board, BoardElement, ElementPatch, NewBoard, NewElement};

#[async_trait]
impl BoardBackend for ApiClient {
    async fn list_boards(&self) -> Result<Vec<Board>> {
        self.get("/api/boards").await
    }

    async fn create_board(&self, board: &NewBoard) -> Result<Board> {
        self.send_json(Method::POST, "/api/boards", board).await
    }

    async fn get_board(&self, id: &str) -> Result<Board> {
        self.get(&format!("/api/boards/{}", segment(id))).await
    }

    async fn delete_board(&self, id: &str) -> Result<()> {
        self.delete(&format!("/api/boards/{}", segment(id))).await
    }

    async fn create_element(&self, board_id: &str, element: &NewElement) -> Result<BoardElement> {
        let path = format!("/api/boards/{}/elements", segment(board_id));
        self.send_json(Method::POST, &path, element).await
    }

    async fn update_element(
        &self,
        board_id: &str,
        element_id: &str,
        patch: &ElementPatch,
    ) -> Result<BoardElement> {
        let path = format!(
            "/api/boards/{}/elements/{}",
            segment(board_id),
            segment(element_id)
        );
        self.send_json(Method::PUT, &path, patch).await
    }

    async fn delete_element(&self, board_id: &str, element_id: &str) -> Result<()> {
        self.delete(&format!(
            "/api/boards/{}/elements/{}",
            segment(board_id),
            segment(element_id)
        ))
        .await
    }
}
