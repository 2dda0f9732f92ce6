use thiserror::Error;

use crate::core::session::SessionState;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Consent denied: {0}")]
    ConsentDenied(String),

    #[error("Matcher transport error: {0}")]
    TransportError(String),

    #[error("Retry budget exhausted, session is locked out")]
    RetryExhausted,

    #[error("Session expired")]
    SessionExpired,

    #[error("Session is busy processing another frame")]
    SessionBusy,

    #[error("Session was aborted")]
    SessionAborted,

    #[error("Session already completed successfully")]
    SessionCompleted,

    #[error("Invalid user id: {0:?}")]
    InvalidUser(String),

    #[error("User {0} already has an active session")]
    SessionAlreadyActive(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("User is cooling down after lockout, retry in {retry_after_secs}s")]
    CoolingDown { retry_after_secs: u64 },

    #[error("No token available in state {0}")]
    TokenUnavailable(SessionState),

    #[error("Issued token has expired")]
    TokenExpired,

    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl AuthError {
    /// Whether the caller may submit another frame to the same session.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::TransportError(_) | AuthError::SessionBusy)
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
