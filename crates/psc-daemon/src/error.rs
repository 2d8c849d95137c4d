//! Error → HTTP mapping.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use psc_schemas::{CoreError, ErrorKind};
use tracing::{error, warn};

use crate::api_types::ErrorResponse;

#[derive(Debug)]
pub struct ApiError(pub CoreError);

pub type ApiResult<T> = Result<T, ApiError>;

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
        ErrorKind::InvalidState | ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
        ErrorKind::LedgerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rej: JsonRejection) -> Self {
        Self(CoreError::validation(rej.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rej: QueryRejection) -> Self {
        Self(CoreError::validation(rej.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind);
        if status.is_server_error() {
            error!(kind = %self.0.kind, error = %self.0.message, "request failed");
        } else if status == StatusCode::FORBIDDEN {
            warn!(error = %self.0.message, "request refused");
        }
        (
            status,
            Json(ErrorResponse {
                success: false,
                error: self.0.message,
                kind: self.0.kind,
            }),
        )
            .into_response()
    }
}
