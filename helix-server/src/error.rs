//! Maps the internal [`HelixError`] taxonomy to the HTTP boundary (§7):
//! this is the one place a `kind` collapses to a stable JSON error code
//! plus an opaque human message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use helix_core::HelixError;
use serde::Serialize;

pub struct ApiError(pub HelixError);

impl From<HelixError> for ApiError {
    fn from(error: HelixError) -> Self {
        Self(error)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody { error: ErrorDetail { code: self.0.code(), message: self.0.to_string() } };
        (status, Json(body)).into_response()
    }
}
