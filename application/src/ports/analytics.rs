//! Analytics port
//!
//! Records per-query outcomes without ever blocking the request path, and
//! serves the aggregate queries exposed by the analytics endpoint.

use async_trait::async_trait;
use crossmind_domain::{
    AnalyticsSummary, FeedbackRecord, ModelPerformance, QueryAnalyticsRecord, TrendPoint,
};
use std::time::Duration;

/// Analytics sink and read queries
#[async_trait]
pub trait Analytics: Send + Sync {
    /// Hand off a query row. Must not block; implementations queue and drain
    /// in the background, dropping (and logging) on overflow.
    fn record_query(&self, record: QueryAnalyticsRecord);

    /// Hand off a user feedback row. Write-only; feedback never affects
    /// scoring.
    fn record_feedback(&self, feedback: FeedbackRecord);

    /// Aggregates over the trailing window.
    async fn summary(&self, window: Duration) -> AnalyticsSummary;

    /// Per-model aggregates over the trailing window.
    async fn model_performance(&self, window: Duration) -> Vec<ModelPerformance>;

    /// Time-bucketed consensus-score mean and p95 latency.
    async fn trend(&self, window: Duration, bucket: Duration) -> Vec<TrendPoint>;

    /// Current queue depth, for the health report.
    fn backlog(&self) -> usize;
}

/// Analytics that goes nowhere. Stands in when analytics is disabled.
pub struct NoAnalytics;

#[async_trait]
impl Analytics for NoAnalytics {
    fn record_query(&self, _record: QueryAnalyticsRecord) {}

    fn record_feedback(&self, _feedback: FeedbackRecord) {}

    async fn summary(&self, _window: Duration) -> AnalyticsSummary {
        AnalyticsSummary::default()
    }

    async fn model_performance(&self, _window: Duration) -> Vec<ModelPerformance> {
        Vec::new()
    }

    async fn trend(&self, _window: Duration, _bucket: Duration) -> Vec<TrendPoint> {
        Vec::new()
    }

    fn backlog(&self) -> usize {
        0
    }
}
