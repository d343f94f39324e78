use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::error::Error;
use std::fmt;
use std::io;

/// The primary error type for the application.
///
/// Every handler returns `AppResult<T>`; the variant decides the HTTP status
/// and how much detail reaches the client.
#[derive(Debug)]
pub enum AppError {
    /// For internal server errors that are not expected to be handled by the client.
    Internal(anyhow::Error),
    /// For client errors due to invalid requests.
    BadRequest(String),
    /// For when a requested category, file or path is missing.
    NotFound(String),
    /// For when a request conflicts with the current state of the library.
    Conflict(String),
    /// For when user input is invalid.
    InvalidInput(String),
    /// For when a folder path cannot be used as the library root.
    InvalidPath(String),
    /// For when the OS refused access to a path.
    PermissionDenied(String),
    /// For when a specific field in a request fails validation.
    ValidationError {
        /// The name of the field that failed validation.
        field: String,
        /// A message describing the validation error.
        message: String,
    },
    /// A filesystem operation failed. Only `message` is sent to the client;
    /// the underlying error is logged.
    Operation {
        message: &'static str,
        source: io::Error,
    },
}

impl AppError {
    /// Wraps an I/O failure behind a fixed, operation-level message.
    pub fn operation(message: &'static str, source: io::Error) -> Self {
        AppError::Operation { message, source }
    }

    /// Maps an I/O error to the closest client-facing variant.
    ///
    /// `subject` names what was being touched ("category 'a'", "file 'x.png'").
    pub fn from_io(err: io::Error, subject: &str, message: &'static str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => AppError::NotFound(format!("{} not found", subject)),
            io::ErrorKind::AlreadyExists => AppError::Conflict(format!("{} already exists", subject)),
            io::ErrorKind::PermissionDenied => {
                AppError::PermissionDenied(format!("permission denied for {}", subject))
            }
            _ => AppError::operation(message, err),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(e) => write!(f, "Internal error: {}", e),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            AppError::InvalidPath(msg) => write!(f, "Invalid path: {}", msg),
            AppError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            AppError::ValidationError { field, message } => {
                write!(f, "Validation error on field '{}': {}", field, message)
            }
            AppError::Operation { message, source } => write!(f, "{}: {}", message, source),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Internal(e) => Some(e.as_ref()),
            AppError::Operation { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, error_message, details) = match self {
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                let error_id = uuid::Uuid::new_v4();
                tracing::error!("Error ID: {}", error_id);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                    Some(json!({ "error_id": error_id.to_string() })),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg, None),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg, None),
            AppError::InvalidPath(msg) => (StatusCode::BAD_REQUEST, "INVALID_PATH", msg, None),
            AppError::PermissionDenied(msg) => (StatusCode::FORBIDDEN, "PERMISSION_DENIED", msg, None),
            AppError::ValidationError { field, message } => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                format!("Validation failed for field '{}'", field),
                Some(json!({ "field": field, "message": message })),
            ),
            AppError::Operation { message, source } => {
                tracing::error!("{}: {} ({:?})", message, source, source.kind());
                (StatusCode::INTERNAL_SERVER_ERROR, "OPERATION_FAILED", message.to_string(), None)
            }
        };

        let mut body = json!({
            "error": {
                "code": error_code,
                "message": error_message,
            },
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        if let Some(details) = details {
            body["error"]["details"] = details;
        }

        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

/// A type alias for `Result<T, AppError>`, used throughout the application.
pub type AppResult<T> = Result<T, AppError>;
