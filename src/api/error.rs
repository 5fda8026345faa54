//! Mapping of engine errors onto http responses.
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::api::dto::ApiResponse;
use crate::error::RegoError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Rego(#[from] RegoError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Rego(e) => match e {
                RegoError::Validation(_) => StatusCode::BAD_REQUEST,
                RegoError::Authorization(_) => StatusCode::FORBIDDEN,
                RegoError::NotFound { .. } => StatusCode::NOT_FOUND,
                RegoError::Conflict(_) => StatusCode::CONFLICT,
                RegoError::ResourceExhausted => StatusCode::SERVICE_UNAVAILABLE,
                RegoError::Storage(_) | RegoError::Codec(_) | RegoError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ApiResponse::<()>::failure(message))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
