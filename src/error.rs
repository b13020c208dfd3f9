use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A connection-pool error.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// An I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A row was missing an expected column.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// A validation error (weak password, malformed cpf/email, duplicates).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Bad credentials. The message is deliberately identical for unknown
    /// email and wrong password so accounts cannot be enumerated.
    #[error("Authentication failed: {0}")]
    Credentials(String),

    /// The account exists but is deactivated.
    #[error("Account is inactive")]
    Inactive,

    /// The account is temporarily locked after repeated failed logins.
    #[error("Account temporarily locked. Try again in {minutes} minute(s)")]
    Locked { minutes: i64 },

    /// Missing, malformed, expired or tampered bearer token. The sub-case is
    /// never exposed beyond generic wording.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A refresh/session operation was refused; the reason is user-actionable
    /// (e.g. "wait N seconds") and not security-sensitive.
    #[error("Session refused: {0}")]
    SessionRefused(String),

    /// A resource not found error. Also used for sessions that exist but do
    /// not belong to the caller.
    #[error("Resource not found")]
    NotFound,

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::Pool(ref e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::Io(ref e) => {
                tracing::error!("IO error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }

            AppError::MissingData(ref col) => {
                tracing::error!("Row missing column: {}", col);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::Credentials(ref msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                (StatusCode::UNAUTHORIZED, msg.clone())
            }

            AppError::Inactive => {
                tracing::warn!("Attempt to use an inactive account");
                (
                    StatusCode::FORBIDDEN,
                    "Account is inactive. Contact the administrator".to_string(),
                )
            }

            AppError::Locked { minutes } => {
                tracing::warn!("Login attempt on locked account ({} min remaining)", minutes);
                (
                    StatusCode::UNAUTHORIZED,
                    format!(
                        "Account temporarily locked due to repeated failed login attempts. \
                         Try again in {} minute(s)",
                        minutes
                    ),
                )
            }

            AppError::Unauthorized(ref msg) => {
                tracing::warn!("Unauthorized: {}", msg);
                (StatusCode::UNAUTHORIZED, msg.clone())
            }

            AppError::Forbidden(ref msg) => {
                tracing::warn!("Forbidden: {}", msg);
                (StatusCode::FORBIDDEN, msg.clone())
            }

            AppError::SessionRefused(ref msg) => {
                tracing::warn!("Session operation refused: {}", msg);
                (StatusCode::UNAUTHORIZED, msg.clone())
            }

            AppError::NotFound => {
                tracing::debug!("Resource not found");
                (StatusCode::NOT_FOUND, "Resource not found".to_string())
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

        (status, body).into_response()
    }
}
