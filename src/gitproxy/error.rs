use std::io;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

/// Malformed pkt-line data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid pkt-line length")]
    InvalidLength,

    #[error("pkt-line length too small")]
    TooSmall,

    #[error("pkt-line too large")]
    TooLarge,

    #[error("pkt-line truncated")]
    Truncated,

    #[error("invalid ref update command: {0}")]
    InvalidCommand(String),
}

/// Failure to run a pack subprocess at all.
#[derive(Error, Debug)]
pub enum CommandError {
    /// the binary does not exist
    #[error("command not found: {0}")]
    NotFound(String),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("i/o with subprocess: {0}")]
    Io(#[from] io::Error),
}

impl CommandError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CommandError::NotFound(_))
    }
}

/// The authentication backend itself failed (as opposed to rejecting the caller).
#[derive(Error, Debug, Clone)]
#[error("authentication failed: {0}")]
pub struct AuthError(pub String);

/// An event could not be recorded.
#[derive(Error, Debug, Clone)]
#[error("event log: {0}")]
pub struct EventLogError(pub String);

/// A request the git proxy answers with an error status.
#[derive(Error, Debug)]
pub enum GitHttpError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("authentication required")]
    Unauthorized,

    #[error("{0} may not push")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GitHttpError {
    pub fn status(&self) -> StatusCode {
        match self {
            GitHttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GitHttpError::Unauthorized => StatusCode::UNAUTHORIZED,
            GitHttpError::Forbidden(_) => StatusCode::FORBIDDEN,
            GitHttpError::NotFound(_) => StatusCode::NOT_FOUND,
            GitHttpError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            GitHttpError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GitHttpError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CommandError> for GitHttpError {
    fn from(err: CommandError) -> Self {
        if err.is_not_found() {
            GitHttpError::NotFound(err.to_string())
        } else {
            GitHttpError::Internal(err.to_string())
        }
    }
}

impl From<AuthError> for GitHttpError {
    fn from(err: AuthError) -> Self {
        GitHttpError::Internal(err.to_string())
    }
}

impl IntoResponse for GitHttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = match &self {
            GitHttpError::Internal(detail) => {
                error!(error = %detail, "git request failed");
                (status, "500 Internal Server Error".to_string()).into_response()
            }
            GitHttpError::Unauthorized => (
                status,
                [(header::WWW_AUTHENTICATE, "Basic realm=\"git\"")],
                "401 Unauthorized".to_string(),
            )
                .into_response(),
            GitHttpError::BadRequest(detail) => (status, format!("400 Bad Request\n\n{}", detail)).into_response(),
            _ => (status, format!("{} {}", status.as_u16(), status.canonical_reason().unwrap_or(""))).into_response(),
        };
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        response
    }
}
