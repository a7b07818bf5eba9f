//! Bearer gate, rate limiting, and the inflight cap.
//!
//! Order matters: the inflight cap fires first (503 with a one second
//! retry hint), then the bearer token is parsed (401) and checked against
//! the configured set (403), then the token's bucket for the route class is
//! consulted (429 with the bucket's refill interval).

use crate::http::error::ApiError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use crossmind_domain::ErrorKind;
use crossmind_infrastructure::RouteClass;
use tracing::debug;

pub async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let _permit = match state.inflight.clone().try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            debug!("inflight cap reached, rejecting request");
            return ApiError::new(ErrorKind::Overloaded, "server is at capacity")
                .with_retry_after(1)
                .into_response();
        }
    };

    let token = match bearer_token(&request) {
        Ok(token) => token,
        Err(err) => return err.into_response(),
    };
    if !state.api_keys.contains(token) {
        return ApiError::new(ErrorKind::Forbidden, "unknown bearer token").into_response();
    }

    let class = route_class_for(request.uri().path());
    if let Err(retry_after) = state.rate_limiter.check(token, class) {
        return ApiError::new(
            ErrorKind::RateLimited,
            format!("budget for the {} route class is exhausted", class.as_str()),
        )
        .with_retry_after(retry_after.as_secs())
        .into_response();
    }

    next.run(request).await
}

/// Route class for a request path. Consensus and batch carry their own
/// budgets; everything else shares the read-only budget.
fn route_class_for(path: &str) -> RouteClass {
    match path {
        "/consensus" => RouteClass::Consensus,
        "/consensus/batch" => RouteClass::Batch,
        _ => RouteClass::ReadOnly,
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
pub(crate) fn bearer_token(request: &Request) -> Result<&str, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| ApiError::new(ErrorKind::Unauthorized, "Authorization header required"))?;
    let value = header
        .to_str()
        .map_err(|_| ApiError::new(ErrorKind::Unauthorized, "malformed Authorization header"))?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::new(ErrorKind::Unauthorized, "bearer scheme required"))?
        .trim();
    if token.is_empty() {
        return Err(ApiError::new(ErrorKind::Unauthorized, "empty bearer token"));
    }
    Ok(token)
}
