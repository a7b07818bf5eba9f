//! `GET /analytics/performance`: aggregates from the analytics sink.

use crate::http::error::ApiError;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::Json;
use crossmind_application::Analytics;
use crossmind_domain::ErrorKind;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct AnalyticsParams {
    #[serde(default)]
    pub timeframe: Option<String>,
    #[serde(default)]
    pub metric_type: Option<String>,
}

/// Parse a `30m` / `24h` / `7d` style timeframe.
fn parse_timeframe(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw.len().checked_sub(1)?;
    if !raw.is_char_boundary(split) {
        return None;
    }
    let (digits, unit) = raw.split_at(split);
    let value: u64 = digits.parse().ok()?;
    if value == 0 {
        return None;
    }
    match unit {
        "m" => Some(Duration::from_secs(value * 60)),
        "h" => Some(Duration::from_secs(value * 3600)),
        "d" => Some(Duration::from_secs(value * 86_400)),
        _ => None,
    }
}

pub async fn performance(
    State(state): State<AppState>,
    Query(params): Query<AnalyticsParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let timeframe_label = params.timeframe.unwrap_or_else(|| "24h".to_string());
    let window = parse_timeframe(&timeframe_label).ok_or_else(|| {
        ApiError::new(
            ErrorKind::InvalidRequest,
            format!("unparseable timeframe: {timeframe_label}"),
        )
    })?;

    let metric_type = params.metric_type.as_deref();
    if !matches!(metric_type, None | Some("summary") | Some("models") | Some("trend")) {
        return Err(ApiError::new(
            ErrorKind::InvalidRequest,
            "metric_type must be one of summary, models, trend",
        ));
    }

    let mut body = json!({ "timeframe": timeframe_label });
    let sections = body.as_object_mut().expect("body is an object");

    if matches!(metric_type, None | Some("summary")) {
        let summary = state.analytics.summary(window).await;
        sections.insert("summary".to_string(), serde_json::to_value(summary).unwrap_or_default());
    }
    if matches!(metric_type, None | Some("models")) {
        let performance = state.analytics.model_performance(window).await;
        sections.insert(
            "model_performance".to_string(),
            serde_json::to_value(performance).unwrap_or_default(),
        );
    }
    if matches!(metric_type, None | Some("trend")) {
        // Two dozen buckets across the window, never finer than a minute.
        let bucket = Duration::from_secs((window.as_secs() / 24).max(60));
        let trend = state.analytics.trend(window, bucket).await;
        sections.insert(
            "trend".to_string(),
            serde_json::to_value(trend).unwrap_or_default(),
        );
    }

    Ok(Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_parsing() {
        assert_eq!(parse_timeframe("30m"), Some(Duration::from_secs(1800)));
        assert_eq!(parse_timeframe("24h"), Some(Duration::from_secs(86_400)));
        assert_eq!(parse_timeframe("7d"), Some(Duration::from_secs(604_800)));
        assert_eq!(parse_timeframe("0h"), None);
        assert_eq!(parse_timeframe("soon"), None);
        assert_eq!(parse_timeframe(""), None);
    }
}
