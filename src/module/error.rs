use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::storage::StorageError;

/// Module proxy errors, one variant per response status.
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ModuleError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ModuleError::NotFound(_))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ModuleError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ModuleError::NotFound(_) => StatusCode::NOT_FOUND,
            ModuleError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ModuleError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StorageError> for ModuleError {
    fn from(err: StorageError) -> Self {
        if err.is_not_found() {
            ModuleError::NotFound(err.to_string())
        } else {
            ModuleError::Internal(err.to_string())
        }
    }
}

impl From<zip::result::ZipError> for ModuleError {
    fn from(err: zip::result::ZipError) -> Self {
        ModuleError::Internal(format!("zip: {}", err))
    }
}

impl From<std::io::Error> for ModuleError {
    fn from(err: std::io::Error) -> Self {
        ModuleError::Internal(format!("io: {}", err))
    }
}

impl IntoResponse for ModuleError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ModuleError::Internal(detail) => {
                error!(error = %detail, "module proxy request failed");
                "500 Internal Server Error".to_string()
            }
            ModuleError::BadRequest(detail) => format!("400 Bad Request\n\n{}", detail),
            ModuleError::NotFound(_) => "404 Not Found".to_string(),
            ModuleError::MethodNotAllowed => "405 Method Not Allowed".to_string(),
        };
        (status, body).into_response()
    }
}

pub type ModuleResult<T> = Result<T, ModuleError>;
