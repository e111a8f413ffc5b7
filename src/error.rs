// Error taxonomy for the chat service

use hyper::StatusCode;

/// Domain errors raised by the services and mapped to HTTP statuses at the
/// request boundary.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Malformed or missing input
    #[error("{0}")]
    Validation(String),

    /// Missing, invalid or expired session
    #[error("Authentication required")]
    Authentication,

    /// Authenticated but insufficient role
    #[error("Admin privileges required")]
    Authorization,

    /// Unknown user or message
    #[error("{0}")]
    NotFound(String),

    /// Duplicate username
    #[error("{0}")]
    Conflict(String),

    /// Muted sender, banned recipient, self-moderation
    #[error("{0}")]
    State(String),

    /// Storage I/O failure, propagated unmodified
    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),

    /// Corrupt or unwritable data document
    #[error("Data format error: {0}")]
    Format(#[from] serde_json::Error),
}

impl ChatError {
    /// HTTP status this error maps to
    pub fn status(&self) -> StatusCode {
        match self {
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::Authentication => StatusCode::UNAUTHORIZED,
            ChatError::Authorization => StatusCode::FORBIDDEN,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::Conflict(_) => StatusCode::BAD_REQUEST,
            ChatError::State(_) => StatusCode::FORBIDDEN,
            ChatError::Io(_) | ChatError::Format(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the client; internal detail is not leaked
    pub fn public_message(&self) -> String {
        match self {
            ChatError::Io(_) | ChatError::Format(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    /// True for errors whose detail should be logged rather than surfaced
    pub fn is_internal(&self) -> bool {
        matches!(self, ChatError::Io(_) | ChatError::Format(_))
    }
}
