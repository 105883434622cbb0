use axum::response::{IntoResponse, Response};
use http::{StatusCode, header};

use crate::core::DriveError;

impl DriveError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DriveError::MalformedRequest(_)
            | DriveError::UnknownPlatform { .. }
            | DriveError::InvalidParameters { .. } => StatusCode::BAD_REQUEST,
            DriveError::NotFound(_) => StatusCode::NOT_FOUND,
            DriveError::BackendUnavailable(_) | DriveError::ReadFailure(_) => StatusCode::BAD_GATEWAY,
            DriveError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            DriveError::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Errors go back as plain text naming what went wrong.
impl IntoResponse for DriveError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}
