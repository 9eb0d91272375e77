use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{watch, RwLock};

use super::collection::Collection;
use super::reconcile::supersedes;
use crate::api::BoardBackend;
use crate::error::{ApiError, Result};
use crate::models::{Board, BoardElement, ElementPatch, NewBoard, NewElement};
use crate::notify::Notifier;

pub struct BoardStore {
    backend: Arc<dyn BoardBackend>,
    boards: Collection<Board>,
    active: RwLock<Option<String>>,
    elements: Collection<BoardElement>,
    notifier: Notifier,
}

impl BoardStore {
    pub fn new(backend: Arc<dyn BoardBackend>, notifier: Notifier, protection: Duration) -> Self {
        Self {
            backend,
            boards: Collection::new(protection),
            active: RwLock::new(None),
            elements: Collection::new(protection),
            notifier,
        }
    }

    pub async fn boards(&self) -> Arc<Vec<Board>> {
        self.boards.snapshot().await
    }

    pub async fn active_board(&self) -> Option<String> {
        self.active.read().await.clone()
    }

    /// Elements of the open board, bottom-most first.
    pub async fn elements(&self) -> Vec<BoardElement> {
        let mut elements = self.elements.snapshot().await.to_vec();
        elements.sort_by_key(|e| e.z_index);
        elements
    }

    pub async fn element(&self, id: &str) -> Option<BoardElement> {
        self.elements.get(id).await
    }

    pub fn subscribe_elements(&self) -> watch::Receiver<u64> {
        self.elements.subscribe()
    }

    pub async fn refresh_boards(&self) -> bool {
        match self.backend.list_boards().await {
            Ok(boards) => {
                // The list endpoint omits elements; keep only board metadata.
                let boards = boards
                    .into_iter()
                    .map(|mut b| {
                        b.elements.clear();
                        b
                    })
                    .collect();
                self.boards.reconcile(boards).await
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to fetch boards");
                false
            }
        }
    }

    pub async fn create_board(&self, name: &str) -> Result<Board> {
        if name.trim().is_empty() {
            let err = ApiError::Validation("Board name is required".to_string());
            self.notifier.error("create board", &err);
            return Err(err);
        }
        match self
            .backend
            .create_board(&NewBoard {
                name: name.trim().to_string(),
            })
            .await
        {
            Ok(board) => {
                self.boards.insert_created(board.clone()).await;
                Ok(board)
            }
            Err(err) => {
                self.notifier.error("create board", &err);
                Err(err)
            }
        }
    }

    pub async fn delete_board(&self, id: &str) -> Result<()> {
        let (index, previous) = self
            .boards
            .remove(id)
            .await
            .ok_or_else(|| ApiError::NotFound(format!("Board {id} not found")))?;

        match self.backend.delete_board(id).await {
            Ok(()) => {
                let mut active = self.active.write().await;
                if active.as_deref() == Some(id) {
                    *active = None;
                    self.elements.clear().await;
                }
                Ok(())
            }
            Err(err) => {
                self.boards.reinsert(index, previous).await;
                self.notifier.error("delete board", &err);
                Err(err)
            }
        }
    }

    /// Loads a board and makes it the active canvas.
    pub async fn open(&self, board_id: &str) -> Result<Board> {
        let board = match self.backend.get_board(board_id).await {
            Ok(board) => board,
            Err(err) => {
                self.notifier.error("open board", &err);
                return Err(err);
            }
        };

        let mut active = self.active.write().await;
        if active.as_deref() != Some(board_id) {
            self.elements.clear().await;
            *active = Some(board_id.to_string());
        }
        self.elements.reconcile(board.elements.clone()).await;
        Ok(board)
    }

    /// Refetches the open board's elements, if any.
    pub async fn refresh_elements(&self) -> bool {
        let Some(board_id) = self.active_board().await else {
            return false;
        };
        match self.backend.get_board(&board_id).await {
            Ok(board) => self.elements.reconcile(board.elements).await,
            Err(err) => {
                tracing::warn!(board_id, error = %err, "failed to fetch board");
                false
            }
        }
    }

    async fn require_active(&self) -> Result<String> {
        self.active_board()
            .await
            .ok_or_else(|| ApiError::Validation("No board is open".to_string()))
    }

    pub async fn add_element(&self, element: NewElement) -> Result<BoardElement> {
        let board_id = self.require_active().await?;
        match self.backend.create_element(&board_id, &element).await {
            Ok(created) => {
                self.elements.insert_created(created.clone()).await;
                Ok(created)
            }
            Err(err) => {
                self.notifier.error("add element", &err);
                Err(err)
            }
        }
    }

    pub async fn update_element(&self, id: &str, patch: ElementPatch) -> Result<BoardElement> {
        let board_id = self.require_active().await?;
        let previous = self
            .elements
            .patch(id, |element| patch.apply(element))
            .await
            .ok_or_else(|| ApiError::NotFound(format!("Element {id} not found")))?;

        match self.backend.update_element(&board_id, id, &patch).await {
            Ok(updated) => {
                self.elements.replace(updated.clone()).await;
                Ok(updated)
            }
            Err(err) => {
                self.elements.restore(previous).await;
                self.notifier.error("update element", &err);
                Err(err)
            }
        }
    }

    pub async fn delete_element(&self, id: &str) -> Result<()> {
        let board_id = self.require_active().await?;
        let (index, previous) = self
            .elements
            .remove(id)
            .await
            .ok_or_else(|| ApiError::NotFound(format!("Element {id} not found")))?;

        match self.backend.delete_element(&board_id, id).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.elements.reinsert(index, previous).await;
                self.notifier.error("delete element", &err);
                Err(err)
            }
        }
    }

    pub async fn bring_to_front(&self, id: &str) -> Result<BoardElement> {
        let top = self
            .elements
            .snapshot()
            .await
            .iter()
            .filter(|e| e.id != id)
            .map(|e| e.z_index)
            .max()
            .unwrap_or(0);
        self.update_element(
            id,
            ElementPatch {
                z_index: Some(top + 1),
                ..Default::default()
            },
        )
        .await
    }

    /// Moves every selected element by `(dx, dy)`.
    ///
    /// Issues one update per element rather than a batch call; each element
    /// rolls back on its own. Returns how many updates failed.
    pub async fn move_selection(&self, ids: &HashSet<String>, dx: f64, dy: f64) -> usize {
        let snapshot = self.elements.snapshot().await;
        let moves = snapshot
            .iter()
            .filter(|e| ids.contains(&e.id))
            .map(|e| {
                let patch = ElementPatch::position(e.position_x + dx, e.position_y + dy);
                let id = e.id.clone();
                async move { self.update_element(&id, patch).await }
            });

        join_all(moves)
            .await
            .into_iter()
            .filter(|result| result.is_err())
            .count()
    }

    // ── Push-path mutations ──────────────────────────────────────────

    pub async fn apply_element_updated(&self, element: BoardElement) -> bool {
        if self.active_board().await.as_deref() != Some(element.board_id.as_str()) {
            return false;
        }
        if let Some(existing) = self.elements.get(&element.id).await {
            if !supersedes(&element, &existing) {
                return false;
            }
        }
        self.elements.upsert(element).await;
        true
    }

    pub async fn apply_element_deleted(&self, board_id: &str, element_id: &str) -> bool {
        if self.active_board().await.as_deref() != Some(board_id) {
            return false;
        }
        self.elements.remove(element_id).await.is_some()
    }

    pub async fn clear(&self) {
        *self.active.write().await = None;
        self.elements.clear().await;
        self.boards.clear().await;
    }
}
