use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::emergency::LockInfo;

pub const UPSTREAM_FALLBACK: &str = "AI service temporarily unavailable. Please try again later.";

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    /// Reported as a `success:false` payload with 200, which is what clients check for.
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("System is currently locked due to emergency")]
    Locked(LockInfo),

    #[error("upstream unavailable: {0}")]
    Upstream(String),

    #[error(transparent)]
    Store(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn upstream(detail: impl Into<String>) -> Self {
        Self::Upstream(detail.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::OK,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Locked(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::Validation(message) | Self::NotFound(message) | Self::Forbidden(message) => {
                json!({ "success": false, "message": message })
            }
            Self::Locked(lock_info) => {
                json!({ "success": false, "message": self.to_string(), "lockInfo": lock_info })
            }
            Self::Upstream(detail) => {
                tracing::warn!(%detail, "completion provider unavailable");
                json!({ "success": false, "message": UPSTREAM_FALLBACK })
            }
            Self::Store(err) => {
                tracing::error!(error = %err, "store failure");
                json!({ "success": false, "message": "Database error" })
            }
            Self::Internal(err) => {
                tracing::error!("{}\n\n{}", err, err.backtrace());
                json!({ "success": false, "message": "Internal server error" })
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Upstream(err.to_string())
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self::Internal(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(tower_sessions::session::Error);
apperr_impl!(time::error::ComponentRange);
