use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    /// A collaborator (catalog store, search index, counter store, embedding
    /// service) failed. `operation` names the call that failed.
    #[error("Backend unavailable during {operation}: {message}")]
    BackendUnavailable {
        operation: &'static str,
        message: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn backend(operation: &'static str, message: impl Into<String>) -> Self {
        AppError::BackendUnavailable {
            operation,
            message: message.into(),
        }
    }

    /// Name of the failed collaborator call, if this is a backend error
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            AppError::BackendUnavailable { operation, .. } => Some(operation),
            _ => None,
        }
    }
}

/// Tags a collaborator error with the operation that produced it.
///
/// ```rust,ignore
/// let rows = sqlx::query_as(...).fetch_all(&pool).await.during("catalog.get_by_id")?;
/// ```
pub trait BackendContext<T> {
    fn during(self, operation: &'static str) -> AppResult<T>;
}

impl<T, E: std::fmt::Display> BackendContext<T> for Result<T, E> {
    fn during(self, operation: &'static str) -> AppResult<T> {
        self.map_err(|e| {
            tracing::warn!(operation, error = %e, "Backend call failed");
            AppError::backend(operation, e.to_string())
        })
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BackendUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
