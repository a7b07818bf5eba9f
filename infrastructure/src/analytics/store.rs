//! In-memory analytics index.
//!
//! Holds the recent query rows and feedback entries and answers the window
//! queries. The JSONL files on disk are the durable record; this index only
//! ever sees what the drain task feeds it and is bounded, dropping the oldest
//! rows past capacity.

use chrono::{DateTime, Utc};
use crossmind_domain::{
    AnalyticsSummary, FeedbackRecord, ModelPerformance, QueryAnalyticsRecord, TrendPoint,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::RwLock;
use std::time::Duration;

const DEFAULT_MAX_ROWS: usize = 100_000;

pub struct AnalyticsStore {
    rows: RwLock<VecDeque<QueryAnalyticsRecord>>,
    feedback: RwLock<Vec<FeedbackRecord>>,
    max_rows: usize,
}

impl Default for AnalyticsStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ROWS)
    }
}

impl AnalyticsStore {
    pub fn new(max_rows: usize) -> Self {
        Self {
            rows: RwLock::new(VecDeque::new()),
            feedback: RwLock::new(Vec::new()),
            max_rows: max_rows.max(1),
        }
    }

    pub fn apply_query(&self, record: QueryAnalyticsRecord) {
        let mut rows = match self.rows.write() {
            Ok(rows) => rows,
            Err(poisoned) => poisoned.into_inner(),
        };
        if rows.len() == self.max_rows {
            rows.pop_front();
        }
        rows.push_back(record);
    }

    pub fn apply_feedback(&self, record: FeedbackRecord) {
        let mut feedback = match self.feedback.write() {
            Ok(feedback) => feedback,
            Err(poisoned) => poisoned.into_inner(),
        };
        feedback.push(record);
    }

    pub fn row_count(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn feedback_count(&self) -> usize {
        self.feedback.read().map(|f| f.len()).unwrap_or(0)
    }

    fn rows_within(&self, window: Duration) -> Vec<QueryAnalyticsRecord> {
        let cutoff = cutoff_for(window);
        self.rows
            .read()
            .map(|rows| {
                rows.iter()
                    .filter(|row| row.timestamp >= cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn summary(&self, window: Duration) -> AnalyticsSummary {
        let rows = self.rows_within(window);
        if rows.is_empty() {
            return AnalyticsSummary::default();
        }

        let count = rows.len();
        let successes = rows.iter().filter(|r| r.success).count();
        let cache_hits = rows.iter().filter(|r| r.cache_hit).count();

        let mut latencies: Vec<f64> = rows.iter().map(|r| r.total_latency_secs).collect();
        latencies.sort_by(f64::total_cmp);
        let mut scores: Vec<f64> = rows
            .iter()
            .filter(|r| r.success)
            .map(|r| r.consensus_score)
            .collect();
        scores.sort_by(f64::total_cmp);

        AnalyticsSummary {
            count,
            success_rate: successes as f64 / count as f64,
            median_latency_secs: percentile(&latencies, 0.5),
            median_consensus_score: percentile(&scores, 0.5),
            cache_hit_rate: cache_hits as f64 / count as f64,
        }
    }

    pub fn model_performance(&self, window: Duration) -> Vec<ModelPerformance> {
        #[derive(Default)]
        struct Accumulator {
            latencies: Vec<f64>,
            agreements: Vec<f64>,
            calls: usize,
            successes: usize,
            cost: f64,
        }

        let rows = self.rows_within(window);
        let mut by_model: HashMap<String, Accumulator> = HashMap::new();

        for row in &rows {
            let share = if row.per_model_latency.is_empty() {
                0.0
            } else {
                row.cost_estimate / row.per_model_latency.len() as f64
            };
            for (model_id, latency) in &row.per_model_latency {
                let acc = by_model.entry(model_id.clone()).or_default();
                acc.calls += 1;
                acc.latencies.push(*latency);
                acc.cost += share;
                if row.per_model_success.get(model_id).copied().unwrap_or(false) {
                    acc.successes += 1;
                }
                if let Some(agreement) = row.per_model_agreement.get(model_id) {
                    acc.agreements.push(*agreement);
                }
            }
        }

        let mut performances: Vec<ModelPerformance> = by_model
            .into_iter()
            .map(|(model_id, mut acc)| {
                acc.latencies.sort_by(f64::total_cmp);
                let mean_agreement = if acc.agreements.is_empty() {
                    0.0
                } else {
                    acc.agreements.iter().sum::<f64>() / acc.agreements.len() as f64
                };
                ModelPerformance {
                    model_id,
                    total_calls: acc.calls,
                    success_rate: acc.successes as f64 / acc.calls.max(1) as f64,
                    p50_latency_secs: percentile(&acc.latencies, 0.5),
                    p95_latency_secs: percentile(&acc.latencies, 0.95),
                    mean_agreement,
                    cost_estimate: acc.cost,
                }
            })
            .collect();
        performances.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        performances
    }

    pub fn trend(&self, window: Duration, bucket: Duration) -> Vec<TrendPoint> {
        let bucket_secs = bucket.as_secs().max(1) as i64;
        let rows = self.rows_within(window);

        let mut buckets: BTreeMap<i64, Vec<&QueryAnalyticsRecord>> = BTreeMap::new();
        for row in &rows {
            let ts = row.timestamp.timestamp();
            let start = ts - ts.rem_euclid(bucket_secs);
            buckets.entry(start).or_default().push(row);
        }

        buckets
            .into_iter()
            .filter_map(|(start, bucket_rows)| {
                let bucket_start = DateTime::<Utc>::from_timestamp(start, 0)?;
                let count = bucket_rows.len();
                let mean_consensus_score = bucket_rows
                    .iter()
                    .map(|r| r.consensus_score)
                    .sum::<f64>()
                    / count as f64;
                let mut latencies: Vec<f64> =
                    bucket_rows.iter().map(|r| r.total_latency_secs).collect();
                latencies.sort_by(f64::total_cmp);
                Some(TrendPoint {
                    bucket_start,
                    count,
                    mean_consensus_score,
                    p95_latency_secs: percentile(&latencies, 0.95),
                })
            })
            .collect()
    }

    /// Drop rows older than the retention window. Returns how many went.
    pub fn prune(&self, retention: Duration) -> usize {
        let cutoff = cutoff_for(retention);
        let mut rows = match self.rows.write() {
            Ok(rows) => rows,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = rows.len();
        rows.retain(|row| row.timestamp >= cutoff);
        before - rows.len()
    }
}

fn cutoff_for(window: Duration) -> DateTime<Utc> {
    let window = chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::days(365));
    Utc::now() - window
}

/// Nearest-rank percentile over a sorted slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted[index.min(sorted.len() - 1)]
}
