use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use paddy_model_provider::{PredictionError, image::ImageError};
use serde::Serialize;

/// Everything `/api/predict` can fail with. Rendered as `{"error": <message>}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No image file provided")]
    MissingInput,

    /// Body claimed to be multipart but could not be read
    #[error("{message}")]
    Multipart { status: StatusCode, message: String },

    #[error("{0}")]
    Decode(#[from] ImageError),

    #[error(transparent)]
    Inference(#[from] PredictionError),

    #[error("{0} is not available on this server")]
    DependencyUnavailable(&'static str),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingInput => StatusCode::BAD_REQUEST,
            ApiError::Multipart { status, .. } => *status,
            ApiError::Decode(_) | ApiError::Inference(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        ApiError::Multipart {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorBody {
            error: String,
        }

        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "{}", self);
        } else {
            tracing::warn!(status = status.as_u16(), "{}", self);
        }

        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
