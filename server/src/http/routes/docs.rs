//! `GET /docs` and `GET /openapi.json`. Unauthenticated.

use axum::response::Html;
use axum::Json;
use serde_json::json;

pub async fn docs() -> Html<&'static str> {
    Html(
        r#"<!doctype html>
<html>
<head><title>Crossmind Consensus API</title></head>
<body>
<h1>Crossmind Consensus API</h1>
<p>Multi-LLM consensus service. The machine-readable contract lives at
<a href="/openapi.json">/openapi.json</a>.</p>
<ul>
<li><code>POST /consensus</code>: one question, one consensus answer</li>
<li><code>POST /consensus/batch</code>: up to 50 questions</li>
<li><code>GET /models</code>: descriptors and runtime status</li>
<li><code>GET /analytics/performance</code>: aggregate outcomes</li>
<li><code>POST /feedback</code>: rate a served answer</li>
<li><code>GET /health</code>: liveness</li>
</ul>
</body>
</html>"#,
    )
}

pub async fn openapi() -> Json<serde_json::Value> {
    Json(json!({
        "openapi": "3.0.3",
        "info": {
            "title": "Crossmind Consensus API",
            "description": "Multi-LLM consensus engine with agreement scoring and chain refinement",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "paths": {
            "/consensus": {"post": {"summary": "Single consensus query", "security": [{"bearer": []}]}},
            "/consensus/batch": {"post": {"summary": "Batch of up to 50 queries", "security": [{"bearer": []}]}},
            "/models": {"get": {"summary": "List model descriptors", "security": [{"bearer": []}]}},
            "/analytics/performance": {"get": {"summary": "Aggregate analytics", "security": [{"bearer": []}]}},
            "/feedback": {"post": {"summary": "Rate a consensus result", "security": [{"bearer": []}]}},
            "/health": {"get": {"summary": "Liveness"}},
        },
        "components": {
            "securitySchemes": {
                "bearer": {"type": "http", "scheme": "bearer"}
            }
        },
    }))
}
