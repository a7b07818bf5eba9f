//! Analytics hub.
//!
//! Ingest is a bounded channel: `record_*` never blocks the request path, and
//! overflow drops the record with a log line instead of applying
//! backpressure. A single background consumer drains events into the
//! in-memory store and appends one JSON line per record to the analytics log
//! when a directory is configured.

use crate::analytics::store::AnalyticsStore;
use async_trait::async_trait;
use crossmind_application::Analytics;
use crossmind_domain::{
    AnalyticsSummary, FeedbackRecord, ModelPerformance, QueryAnalyticsRecord, TrendPoint,
};
use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

enum AnalyticsEvent {
    Query(QueryAnalyticsRecord),
    Feedback(FeedbackRecord),
}

pub struct AnalyticsHub {
    tx: mpsc::Sender<AnalyticsEvent>,
    store: Arc<AnalyticsStore>,
    capacity: usize,
    dropped: AtomicU64,
}

/// How often the retention sweep runs.
const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

impl AnalyticsHub {
    /// Start the hub, its drain task, and the hourly retention sweep.
    /// `jsonl_dir`, when set, receives an append-only `analytics.jsonl`.
    pub fn spawn(jsonl_dir: Option<PathBuf>, max_backlog: usize, retention: Duration) -> Arc<Self> {
        let capacity = max_backlog.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let store = Arc::new(AnalyticsStore::default());

        let writer = jsonl_dir.and_then(|dir| open_jsonl(&dir));
        tokio::spawn(drain(rx, Arc::clone(&store), writer));

        let sweep_store = Arc::clone(&store);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(RETENTION_SWEEP_INTERVAL).await;
                let dropped = sweep_store.prune(retention);
                if dropped > 0 {
                    info!(dropped, "pruned analytics rows past retention");
                }
            }
        });

        Arc::new(Self {
            tx,
            store,
            capacity,
            dropped: AtomicU64::new(0),
        })
    }

    /// Records dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn store(&self) -> &Arc<AnalyticsStore> {
        &self.store
    }

    fn enqueue(&self, event: AnalyticsEvent, what: &'static str) {
        if self.tx.try_send(event).is_err() {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(dropped, "analytics queue full, dropping {what} record");
        }
    }
}

fn open_jsonl(dir: &Path) -> Option<std::fs::File> {
    if let Err(e) = std::fs::create_dir_all(dir) {
        warn!("cannot create analytics directory {}: {e}", dir.display());
        return None;
    }
    let path = dir.join("analytics.jsonl");
    match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => {
            info!("analytics log: {}", path.display());
            Some(file)
        }
        Err(e) => {
            warn!("cannot open analytics log {}: {e}", path.display());
            None
        }
    }
}

async fn drain(
    mut rx: mpsc::Receiver<AnalyticsEvent>,
    store: Arc<AnalyticsStore>,
    mut writer: Option<std::fs::File>,
) {
    while let Some(event) = rx.recv().await {
        let line = match &event {
            AnalyticsEvent::Query(record) => json!({"type": "query", "record": record}),
            AnalyticsEvent::Feedback(record) => json!({"type": "feedback", "record": record}),
        };
        if let Some(file) = writer.as_mut() {
            if let Err(e) = writeln!(file, "{line}") {
                warn!("analytics log write failed, disabling persistence: {e}");
                writer = None;
            }
        }
        match event {
            AnalyticsEvent::Query(record) => store.apply_query(record),
            AnalyticsEvent::Feedback(record) => store.apply_feedback(record),
        }
    }
}

#[async_trait]
impl Analytics for AnalyticsHub {
    fn record_query(&self, record: QueryAnalyticsRecord) {
        self.enqueue(AnalyticsEvent::Query(record), "query");
    }

    fn record_feedback(&self, feedback: FeedbackRecord) {
        self.enqueue(AnalyticsEvent::Feedback(feedback), "feedback");
    }

    async fn summary(&self, window: Duration) -> AnalyticsSummary {
        self.store.summary(window)
    }

    async fn model_performance(&self, window: Duration) -> Vec<ModelPerformance> {
        self.store.model_performance(window)
    }

    async fn trend(&self, window: Duration, bucket: Duration) -> Vec<TrendPoint> {
        self.store.trend(window, bucket)
    }

    fn backlog(&self) -> usize {
        self.capacity - self.tx.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crossmind_domain::ConsensusMethod;
    use std::collections::BTreeMap;

    fn record(query_id: &str) -> QueryAnalyticsRecord {
        QueryAnalyticsRecord {
            query_id: query_id.to_string(),
            timestamp: Utc::now(),
            fingerprint: "fp".to_string(),
            method: ConsensusMethod::DirectConsensus,
            consensus_score: 0.9,
            total_latency_secs: 1.0,
            success: true,
            error_kind: None,
            cache_hit: false,
            per_model_latency: BTreeMap::new(),
            per_model_success: BTreeMap::new(),
            per_model_agreement: BTreeMap::new(),
            cost_estimate: 0.0,
        }
    }

    async fn wait_for_rows(hub: &AnalyticsHub, rows: usize) {
        for _ in 0..200 {
            if hub.store().row_count() >= rows {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("drain task never applied {rows} rows");
    }

    #[tokio::test]
    async fn records_flow_through_the_queue() {
        let hub = AnalyticsHub::spawn(None, 100, Duration::from_secs(86_400));
        hub.record_query(record("q1"));
        hub.record_query(record("q2"));
        wait_for_rows(&hub, 2).await;

        let summary = hub.summary(Duration::from_secs(60)).await;
        assert_eq!(summary.count, 2);
        assert_eq!(hub.dropped(), 0);
    }

    #[tokio::test]
    async fn feedback_is_stored() {
        let hub = AnalyticsHub::spawn(None, 100, Duration::from_secs(86_400));
        hub.record_feedback(FeedbackRecord {
            consensus_id: "c1".to_string(),
            rating: 5,
            comment: Some("good".to_string()),
            timestamp: Utc::now(),
        });
        for _ in 0..200 {
            if hub.store().feedback_count() == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("feedback never drained");
    }

    #[tokio::test]
    async fn jsonl_lines_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        let hub = AnalyticsHub::spawn(Some(dir.path().to_path_buf()), 100, Duration::from_secs(86_400));
        hub.record_query(record("q1"));
        wait_for_rows(&hub, 1).await;

        let content = std::fs::read_to_string(dir.path().join("analytics.jsonl")).unwrap();
        assert!(content.contains("\"type\":\"query\""));
        assert!(content.contains("\"query_id\":\"q1\""));
    }
}
