//! Client-side state synchronisation for the taskdeck task/project/board
//! service: optimistic mutations with rollback, snapshot reconciliation,
//! WebSocket push handling with a polling fallback, and board canvas
//! geometry.

pub mod api;
pub mod canvas;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod notify;
pub mod realtime;
pub mod services;
pub mod session;
pub mod store;

pub use api::ApiClient;
pub use config::Config;
pub use error::{ApiError, ErrorKind, Result};
pub use notify::{Notice, NoticeLevel, Notifier};
pub use realtime::{ConnectionState, SocketClient, SocketOptions};
pub use session::SyncSession;
