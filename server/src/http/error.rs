//! The uniform error envelope.
//!
//! Every non-2xx response carries `{error_code, message, details, timestamp}`
//! and the status code mapped from the domain error kind. Per-model provider
//! failures never surface here; if one does, it is a wiring bug and reports
//! as an internal error.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use crossmind_application::{BatchError, EngineError};
use crossmind_domain::ErrorKind;
use serde_json::json;

/// Client disconnect; not in the StatusCode constants.
const STATUS_CLIENT_CLOSED: u16 = 499;

#[derive(Debug)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: serde_json::Value,
    pub retry_after_secs: Option<u64>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: json!({}),
            retry_after_secs: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }

    pub fn status(&self) -> StatusCode {
        match self.kind {
            ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::DeadlineExceeded => StatusCode::REQUEST_TIMEOUT,
            ErrorKind::ConsensusFailed => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Canceled => {
                StatusCode::from_u16(STATUS_CLIENT_CLOSED).unwrap_or(StatusCode::REQUEST_TIMEOUT)
            }
            ErrorKind::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::ProviderTimeout
            | ErrorKind::ProviderHttpError
            | ErrorKind::ProviderParseError
            | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error_code": self.kind.as_str(),
            "message": self.message,
            "details": self.details,
            "timestamp": Utc::now().to_rfc3339(),
        });
        let mut response = (self.status(), Json(body)).into_response();
        if let Some(secs) = self.retry_after_secs {
            if let Ok(value) = secs.to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        response
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::new(err.error_kind(), err.to_string())
    }
}

impl From<BatchError> for ApiError {
    fn from(err: BatchError) -> Self {
        ApiError::new(ErrorKind::InvalidRequest, err.to_string())
    }
}
