use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::AppError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("Internal server error")]
    InternalError(String),

    #[error("{0}")]
    ServiceError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Upstream timeout: {0}")]
    Timeout(String),

    #[error("{message}")]
    Interrupted {
        committed: usize,
        message: String,
        cause: Box<ApiError>,
    },
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Auth(msg) => Self::Unauthorized(msg),
            AppError::Validation(msg) => Self::ValidationError(msg),
            AppError::EmptyDocument | AppError::Extraction(_) => {
                Self::ValidationError(err.to_string())
            }
            AppError::PayloadTooLarge(msg) => Self::PayloadTooLarge(msg),
            AppError::Timeout { .. } => {
                tracing::error!(error = %err, "Upstream call timed out");
                Self::Timeout(err.to_string())
            }
            AppError::Interrupted { committed, source } => Self::Interrupted {
                committed,
                message: format!("{source} ({committed} chunks committed before the failure)"),
                cause: Box::new(Self::from(*source)),
            },
            AppError::EmbeddingService(_)
            | AppError::GenerationService(_)
            | AppError::VectorStore(_) => {
                tracing::error!("Downstream service error: {:?}", err);
                Self::ServiceError(err.to_string())
            }
            AppError::Configuration(_)
            | AppError::Join(_)
            | AppError::Io(_)
            | AppError::InternalError(_) => {
                tracing::error!("Internal error: {:?}", err);
                Self::InternalError("Internal server error".to_string())
            }
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::InternalError(_) | Self::ServiceError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Interrupted { cause, .. } => cause.status(),
        }
    }

    fn message(&self) -> String {
        match self {
            Self::InternalError(message)
            | Self::ServiceError(message)
            | Self::ValidationError(message)
            | Self::Unauthorized(message)
            | Self::PayloadTooLarge(message)
            | Self::Timeout(message) => message.clone(),
            Self::Interrupted { message, .. } => message.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let chunks_committed = match &self {
            Self::Interrupted { committed, .. } => Some(*committed),
            _ => None,
        };
        let error_response = ErrorResponse {
            error: self.message(),
            status: "error".to_string(),
            chunks_committed,
        };

        (self.status(), Json(error_response)).into_response()
    }
}

#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    chunks_committed: Option<usize>,
}
