/// Unified error types for File Depot
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Main error type for the depot
#[derive(Error, Debug)]
pub enum DepotError {
    /// Store connection errors (pool creation, migrations)
    #[error("Store connection error: {0}")]
    Connection(String),

    /// Database errors (reads, writes, deletes against the store)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Chunk layout errors found while reading blob content
    #[error("Blob storage error: {0}")]
    BlobStorage(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Staging area errors (temp file write or cleanup)
    #[error("Staging error: {0}")]
    Staging(String),

    /// Malformed upload requests
    #[error("Upload error: {0}")]
    Upload(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Template rendering errors
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DepotError {
    /// HTTP status this error maps to
    pub fn status(&self) -> StatusCode {
        match self {
            DepotError::NotFound(_) => StatusCode::NOT_FOUND,
            DepotError::Upload(_) | DepotError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Log the error and build a plain-text response carrying `message`
    ///
    /// NotFound errors keep their own status; every other failure is reported
    /// with the route's message so no internal detail reaches the client.
    pub fn into_plain_response(self, message: &str) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "{}", message);
        } else {
            tracing::warn!(error = %self, "{}", message);
        }
        (status, message.to_string()).into_response()
    }
}

/// Convert DepotError to HTTP response
impl IntoResponse for DepotError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            DepotError::NotFound(_) | DepotError::Upload(_) | DepotError::Validation(_) => {
                self.to_string()
            }
            _ => "Internal server error".to_string(), // Don't leak details
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        (status, message).into_response()
    }
}

/// Result type alias for depot operations
pub type DepotResult<T> = Result<T, DepotError>;
