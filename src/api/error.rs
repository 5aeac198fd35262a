//! Unified API error responses.
//!
//! Every endpoint reports failures as `{code, message}` JSON with a
//! status derived from the error class. Computation errors surface to
//! the caller; nothing is swallowed or retried.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::FolioError;

/// JSON body of an error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR",
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "INVALID_REQUEST",
            message: message.into(),
        }
    }
}

impl From<FolioError> for ApiError {
    fn from(err: FolioError) -> Self {
        let (status, code) = match &err {
            FolioError::Import(_) => (StatusCode::BAD_REQUEST, "IMPORT_ERROR"),
            FolioError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            FolioError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            FolioError::MissingPrice { .. } | FolioError::MissingWeights { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "MISSING_DATA")
            }
            FolioError::ZeroPortfolioValue { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "ZERO_PORTFOLIO_VALUE")
            }
            FolioError::Db(_) | FolioError::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR")
            }
        };
        ApiError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// API handler Result type alias
pub type ApiResult<T> = std::result::Result<T, ApiError>;
