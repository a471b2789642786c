use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use docgraph_core::{CoreError, StatusHint};
use serde::Serialize;

/// Thin wrapper translating [`CoreError::status_hint`] into an HTTP
/// status, for the rare case a handler needs to reject a request before
/// the WebSocket upgrade happens.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] CoreError);

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.status_hint() {
            StatusHint::BadRequest => StatusCode::BAD_REQUEST,
            StatusHint::Unauthorized => StatusCode::UNAUTHORIZED,
            StatusHint::NotFound => StatusCode::NOT_FOUND,
            StatusHint::Unprocessable => StatusCode::UNPROCESSABLE_ENTITY,
            StatusHint::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            StatusHint::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            StatusHint::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = axum::Json(ErrorResponse { error: self.0.to_string() });
        (status, body).into_response()
    }
}
