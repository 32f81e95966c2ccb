use crate::models::TabId;
use crate::service::ServiceClosed;
use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The host environment that owns the store is gone.
    #[error("store context is no longer available")]
    ContextGone,

    #[error("failed to read/write store: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed store contents: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("no page is listening in tab {0}")]
    PageUnreachable(TabId),

    #[error("no tab with id {0}")]
    NoSuchTab(TabId),

    #[error("host context is no longer available")]
    ContextGone,
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
        }
    }

    pub fn internal(err: impl std::error::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ContextGone => Self::unavailable(StoreError::ContextGone.to_string()),
            other => Self::internal(other),
        }
    }
}

impl From<ServiceClosed> for AppError {
    fn from(err: ServiceClosed) -> Self {
        Self::unavailable(err.to_string())
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status, self.message).into_response()
    }
}
