//! Per-query analytics rows and the aggregate shapes served back from them.

use crate::core::error::ErrorKind;
use crate::core::request::ConsensusMethod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row per completed query, success or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnalyticsRecord {
    /// Opaque query id (matches the result's `consensus_id`).
    pub query_id: String,
    pub timestamp: DateTime<Utc>,
    pub fingerprint: String,
    pub method: ConsensusMethod,
    pub consensus_score: f64,
    /// End-to-end latency in seconds.
    pub total_latency_secs: f64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub cache_hit: bool,
    /// Per-model latency in seconds, for every model that was called.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub per_model_latency: BTreeMap<String, f64>,
    /// Per-model success flags.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub per_model_success: BTreeMap<String, bool>,
    /// Per-model individual agreement, successful replies only.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub per_model_agreement: BTreeMap<String, f64>,
    /// Rough spend for the query, from descriptor pricing and token counts.
    pub cost_estimate: f64,
}

/// User rating tied to a served consensus result. Write-only: feedback never
/// influences scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub consensus_id: String,
    /// 1-5 rating.
    pub rating: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Aggregates over a time window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub count: usize,
    pub success_rate: f64,
    pub median_latency_secs: f64,
    pub median_consensus_score: f64,
    pub cache_hit_rate: f64,
}

/// Per-model aggregates over a time window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPerformance {
    pub model_id: String,
    pub total_calls: usize,
    pub success_rate: f64,
    pub p50_latency_secs: f64,
    pub p95_latency_secs: f64,
    pub mean_agreement: f64,
    pub cost_estimate: f64,
}

/// One time bucket of the consensus trend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendPoint {
    pub bucket_start: DateTime<Utc>,
    pub count: usize,
    pub mean_consensus_score: f64,
    pub p95_latency_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_roundtrips_through_json() {
        let mut per_model_latency = BTreeMap::new();
        per_model_latency.insert("m1".to_string(), 0.8);

        let record = QueryAnalyticsRecord {
            query_id: "q-1".to_string(),
            timestamp: Utc::now(),
            fingerprint: "abc".to_string(),
            method: ConsensusMethod::Chain,
            consensus_score: 0.91,
            total_latency_secs: 1.2,
            success: true,
            error_kind: None,
            cache_hit: false,
            per_model_latency,
            per_model_success: BTreeMap::new(),
            per_model_agreement: BTreeMap::new(),
            cost_estimate: 0.004,
        };

        let json = serde_json::to_string(&record).unwrap();
        let back: QueryAnalyticsRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.query_id, "q-1");
        assert_eq!(back.per_model_latency["m1"], 0.8);
    }

    #[test]
    fn failed_record_carries_error_kind() {
        let record = QueryAnalyticsRecord {
            query_id: "q-2".to_string(),
            timestamp: Utc::now(),
            fingerprint: "def".to_string(),
            method: ConsensusMethod::ExpertRoles,
            consensus_score: 0.0,
            total_latency_secs: 0.4,
            success: false,
            error_kind: Some(ErrorKind::ConsensusFailed),
            cache_hit: false,
            per_model_latency: BTreeMap::new(),
            per_model_success: BTreeMap::new(),
            per_model_agreement: BTreeMap::new(),
            cost_estimate: 0.0,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["error_kind"], "consensus_failed");
        assert_eq!(json["success"], false);
    }
}
