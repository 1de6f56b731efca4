//! `DomainError` to HTTP response mapping.
//!
//! Bodies are `{"error": <code>, "message": <text>, "retryable": <bool>}`.
//! Backend failures are 503 with `Retry-After`; the message is replaced
//! with a generic one so store internals never leak to clients.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::warn;

use domains::DomainError;

const RETRY_AFTER_SECS: &str = "5";

#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    retryable: bool,
}

pub fn status_for(err: &DomainError) -> StatusCode {
    match err {
        e if e.is_validation() => StatusCode::BAD_REQUEST,
        DomainError::Unauthenticated => StatusCode::UNAUTHORIZED,
        DomainError::Forbidden => StatusCode::FORBIDDEN,
        DomainError::SiteNotFound(_) | DomainError::ReviewNotFound(_) => StatusCode::NOT_FOUND,
        DomainError::AlreadyFlagged => StatusCode::CONFLICT,
        DomainError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        DomainError::SearchUnavailable(_) | DomainError::StoreUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = status_for(&err);
        let retryable = err.is_retryable();
        let message = if retryable {
            warn!(error = %err, "backend unavailable");
            "temporarily unavailable, try again shortly".to_string()
        } else {
            err.to_string()
        };

        let mut response = (
            status,
            Json(ErrorBody {
                error: err.code(),
                message,
                retryable,
            }),
        )
            .into_response();
        if retryable {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
        }
        response
    }
}
