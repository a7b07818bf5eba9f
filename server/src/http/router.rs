//! Route table and CORS wiring.

use crate::http::{auth, routes};
use crate::state::AppState;
use axum::http::HeaderValue;
use axum::routing::{delete, get, post};
use axum::{middleware, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

/// Build the full application router.
///
/// `origins` is the CORS allow-list; an empty list leaves CORS off entirely.
pub fn build_router(state: AppState, origins: &[String]) -> Router {
    let authed = Router::new()
        .route("/consensus", post(routes::consensus::single))
        .route("/consensus/batch", post(routes::consensus::batch))
        .route("/models", get(routes::models::list))
        .route("/analytics/performance", get(routes::analytics::performance))
        .route("/feedback", post(routes::feedback::submit))
        .route("/cache", delete(routes::cache_admin::invalidate))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    let open = Router::new()
        .route("/health", get(routes::health::health))
        .route("/docs", get(routes::docs::docs))
        .route("/openapi.json", get(routes::docs::openapi));

    let mut router = authed.merge(open).with_state(state);
    if !origins.is_empty() {
        router = router.layer(cors_layer(origins));
    }
    router
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(parsed))
        .allow_methods(Any)
        .allow_headers(Any)
}
