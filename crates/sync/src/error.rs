use thiserror::Error;

/// Coarse classification of an [`ApiError`], assigned once at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unauthorized,
    Forbidden,
    Validation,
    NotFound,
    Conflict,
    Network,
    Server,
    Unknown,
}

#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("{0}")]
    Unknown(String),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Unauthorized(_) => ErrorKind::Unauthorized,
            ApiError::Forbidden(_) => ErrorKind::Forbidden,
            ApiError::Validation(_) => ErrorKind::Validation,
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::Conflict(_) => ErrorKind::Conflict,
            ApiError::Network(_) => ErrorKind::Network,
            ApiError::Server { .. } => ErrorKind::Server,
            ApiError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::Unauthorized(m)
            | ApiError::Forbidden(m)
            | ApiError::Validation(m)
            | ApiError::NotFound(m)
            | ApiError::Conflict(m)
            | ApiError::Network(m)
            | ApiError::Unknown(m) => m,
            ApiError::Server { message, .. } => message,
        }
    }

    /// Maps a non-2xx HTTP status onto a typed error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => ApiError::Unauthorized(message),
            403 => ApiError::Forbidden(message),
            400 | 422 => ApiError::Validation(message),
            404 => ApiError::NotFound(message),
            409 => ApiError::Conflict(message),
            500..=599 => ApiError::Server { status, message },
            _ => ApiError::Unknown(message),
        }
    }

    /// True for failures where cached data is a reasonable stand-in.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Network | ErrorKind::Server)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return ApiError::from_status(status.as_u16(), err.to_string());
        }
        if err.is_decode() {
            return ApiError::Unknown(format!("Invalid response body: {err}"));
        }
        ApiError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Unknown(format!("Invalid payload: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
