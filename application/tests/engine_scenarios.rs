//! End-to-end engine scenarios against stub ports.

use async_trait::async_trait;
use crossmind_application::{
    Analytics, ConsensusCache, EmbedError, Embedder, EngineConfig, EngineError, Provider,
    ProviderRegistry, RunBatchUseCase, RunConsensusUseCase,
};
use crossmind_domain::{
    AnalyticsSummary, ConsensusMethod, ConsensusRequest, ConsensusResult, ErrorKind,
    FeedbackRecord, ModelCatalog, ModelDescriptor, ModelPerformance, ProviderCall, ProviderKind,
    ProviderReply, QueryAnalyticsRecord, ReasoningMethod, TrendPoint,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

// -- Stub ports --------------------------------------------------------------

#[derive(Clone)]
enum Behavior {
    Answer { text: &'static str, delay_ms: u64 },
    FailHttp { status: u16 },
    FailThenAnswer { failures: u32, text: &'static str },
    Hang,
}

struct StubProvider {
    behaviors: HashMap<String, Behavior>,
}

#[async_trait]
impl Provider for StubProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAiChat
    }

    async fn invoke(&self, call: &ProviderCall) -> ProviderReply {
        let started = Instant::now();
        let behavior = self
            .behaviors
            .get(call.model_id())
            .cloned()
            .unwrap_or(Behavior::FailHttp { status: 500 });
        match behavior {
            Behavior::Answer { text, delay_ms } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                ProviderReply::success(call.model_id(), text, started.elapsed())
                    .with_estimated_tokens(&call.prompt)
            }
            Behavior::FailHttp { status } => ProviderReply::failure(
                call.model_id(),
                ErrorKind::ProviderHttpError,
                format!("stub returned {status}"),
                started.elapsed(),
            )
            .with_http_status(status),
            Behavior::FailThenAnswer { failures, text } => {
                if call.attempt <= failures {
                    ProviderReply::failure(
                        call.model_id(),
                        ErrorKind::ProviderHttpError,
                        "flaky",
                        started.elapsed(),
                    )
                    .with_http_status(503)
                } else {
                    ProviderReply::success(call.model_id(), text, started.elapsed())
                        .with_estimated_tokens(&call.prompt)
                }
            }
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                ProviderReply::failure(
                    call.model_id(),
                    ErrorKind::Internal,
                    "woke from eternal sleep",
                    started.elapsed(),
                )
            }
        }
    }
}

/// Deterministic embedder with a few fixed directions so tests can force
/// agreement or disagreement.
struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let vector = if text.contains("Python") {
            vec![1.0, 0.0, 0.0]
        } else if text.contains("JavaScript") {
            vec![0.0, 1.0, 0.0]
        } else {
            let mut v = vec![0.1f32; 3];
            for (i, b) in text.bytes().enumerate() {
                v[i % 3] += b as f32;
            }
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            v.into_iter().map(|x| x / norm).collect()
        };
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        3
    }
}

#[derive(Default)]
struct TestCache {
    results: Mutex<HashMap<String, ConsensusResult>>,
    embeddings: Mutex<HashMap<String, Vec<f32>>>,
}

#[async_trait]
impl ConsensusCache for TestCache {
    async fn get_result(&self, fingerprint: &str) -> Option<ConsensusResult> {
        self.results.lock().unwrap().get(fingerprint).cloned()
    }

    async fn put_result(&self, fingerprint: &str, result: &ConsensusResult, _ttl: Duration) {
        self.results
            .lock()
            .unwrap()
            .insert(fingerprint.to_string(), result.clone());
    }

    async fn get_embedding(&self, text_hash: &str) -> Option<Vec<f32>> {
        self.embeddings.lock().unwrap().get(text_hash).cloned()
    }

    async fn put_embedding(&self, text_hash: &str, vector: &[f32], _ttl: Duration) {
        self.embeddings
            .lock()
            .unwrap()
            .insert(text_hash.to_string(), vector.to_vec());
    }

    async fn invalidate(&self, _pattern: &str) -> usize {
        let mut results = self.results.lock().unwrap();
        let removed = results.len();
        results.clear();
        removed
    }

    fn backend_name(&self) -> &'static str {
        "test"
    }
}

#[derive(Default)]
struct TestAnalytics {
    queries: Mutex<Vec<QueryAnalyticsRecord>>,
    feedback: Mutex<Vec<FeedbackRecord>>,
}

#[async_trait]
impl Analytics for TestAnalytics {
    fn record_query(&self, record: QueryAnalyticsRecord) {
        self.queries.lock().unwrap().push(record);
    }

    fn record_feedback(&self, feedback: FeedbackRecord) {
        self.feedback.lock().unwrap().push(feedback);
    }

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

// -- Harness -----------------------------------------------------------------

fn descriptor(id: &str) -> ModelDescriptor {
    ModelDescriptor {
        id: id.to_string(),
        provider_kind: ProviderKind::OpenAiChat,
        endpoint_url: "https://stub.invalid/v1/chat/completions".to_string(),
        model_name: format!("{id}-model"),
        credential_ref: "STUB_API_KEY".to_string(),
        max_tokens: 256,
        default_temperature: 0.7,
        enabled: true,
        cost_per_1k_tokens: 0.002,
        display_name: id.to_uppercase(),
        specialties: BTreeSet::new(),
    }
}

struct Harness {
    engine: Arc<RunConsensusUseCase>,
    cache: Arc<TestCache>,
    analytics: Arc<TestAnalytics>,
}

fn harness(behaviors: Vec<(&str, Behavior)>, config: EngineConfig) -> Harness {
    let descriptors: Vec<ModelDescriptor> = behaviors.iter().map(|(id, _)| descriptor(id)).collect();
    let catalog = Arc::new(ModelCatalog::new(descriptors, vec![]).unwrap());

    let provider = StubProvider {
        behaviors: behaviors
            .into_iter()
            .map(|(id, b)| (id.to_string(), b))
            .collect(),
    };
    let registry = Arc::new(ProviderRegistry::new(vec![Arc::new(provider)]));
    let cache = Arc::new(TestCache::default());
    let analytics = Arc::new(TestAnalytics::default());

    let engine = Arc::new(RunConsensusUseCase::new(
        registry,
        Arc::new(KeywordEmbedder),
        Arc::clone(&cache) as Arc<dyn ConsensusCache>,
        Arc::clone(&analytics) as Arc<dyn Analytics>,
        catalog,
        config,
    ));

    Harness {
        engine,
        cache,
        analytics,
    }
}

fn request(models: &[&str]) -> ConsensusRequest {
    ConsensusRequest {
        question: "What is 2+2?".to_string(),
        roles: vec![],
        selected_model_ids: models.iter().map(|s| s.to_string()).collect(),
        method: ConsensusMethod::DirectConsensus,
        temperature: 0.7,
        weights: None,
        chain_depth: 2,
        enable_chain_of_thought: false,
        reasoning_method: ReasoningMethod::ChainOfThought,
        enable_caching: false,
    }
}

fn fast_config() -> EngineConfig {
    EngineConfig {
        request_timeout: Duration::from_millis(400),
        ..EngineConfig::default()
    }
}

// -- Scenarios ---------------------------------------------------------------

#[tokio::test]
async fn three_agreeing_models_reach_full_consensus() {
    let h = harness(
        vec![
            ("m1", Behavior::Answer { text: "4", delay_ms: 0 }),
            ("m2", Behavior::Answer { text: "4", delay_ms: 0 }),
            ("m3", Behavior::Answer { text: "4", delay_ms: 0 }),
        ],
        EngineConfig::default(),
    );

    let mut req = request(&["m1", "m2", "m3"]);
    req.weights = Some(vec![1.0, 1.0, 1.0]);
    let result = h
        .engine
        .execute(req, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.consensus_text, "4");
    assert!((result.consensus_score - 1.0).abs() < 1e-9);
    assert!(!result.cache_hit);
    assert!(!result.partial);
    assert_eq!(result.per_model.len(), 3);
    assert!(result.chain_trace.is_none(), "identical answers skip the chain");
    assert_eq!(result.verdict, "high agreement");

    // Weights normalise to one.
    let weight_sum: f64 = result.per_model.iter().map(|a| a.weight).sum();
    assert!((weight_sum - 1.0).abs() < 1e-9);

    // Analytics saw exactly one successful row.
    let rows = h.analytics.queries.lock().unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].success);
    assert!(rows[0].cost_estimate > 0.0);
}

#[tokio::test]
async fn cached_replay_returns_semantically_equal_result() {
    let h = harness(
        vec![
            ("m1", Behavior::Answer { text: "4", delay_ms: 0 }),
            ("m2", Behavior::Answer { text: "4", delay_ms: 0 }),
        ],
        EngineConfig::default(),
    );

    let mut req = request(&["m1", "m2"]);
    req.enable_caching = true;

    let first = h
        .engine
        .execute(req.clone(), CancellationToken::new())
        .await
        .unwrap();
    assert!(!first.cache_hit);

    let second = h
        .engine
        .execute(req, CancellationToken::new())
        .await
        .unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.consensus_text, first.consensus_text);
    assert_eq!(second.models_used, first.models_used);
    assert!((second.consensus_score - first.consensus_score).abs() < 1e-9);

    // Only the first run wrote the result cache.
    assert_eq!(h.cache.results.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn low_agreement_triggers_one_chain_round() {
    let h = harness(
        vec![
            ("m1", Behavior::Answer { text: "Python", delay_ms: 0 }),
            ("m2", Behavior::Answer { text: "JavaScript", delay_ms: 0 }),
        ],
        EngineConfig::default(),
    );

    let mut req = request(&["m1", "m2"]);
    req.method = ConsensusMethod::ExpertRoles;
    req.chain_depth = 1;
    let result = h
        .engine
        .execute(req, CancellationToken::new())
        .await
        .unwrap();

    let trace = result.chain_trace.as_ref().expect("chain must have run");
    assert_eq!(trace.len(), 1);
    assert_eq!(trace[0].round, 1);
    assert_eq!(trace[0].critic_id, "m2");
    assert_eq!(trace[0].reviser_id, "m1");
    assert_eq!(result.method_used, ConsensusMethod::ExpertRoles);

    // The acceptance gate guarantees the score never went down.
    let metrics = result.quality_metrics.as_ref().unwrap();
    let initial = metrics["initial_consensus_score"].as_f64().unwrap();
    assert!(result.consensus_score >= initial - 1e-9);
    assert_eq!(metrics["chain_rounds"], serde_json::json!(1));
}

#[tokio::test]
async fn straggler_times_out_and_the_rest_carry_consensus() {
    let h = harness(
        vec![
            ("m1", Behavior::Answer { text: "4", delay_ms: 0 }),
            ("m2", Behavior::Answer { text: "4", delay_ms: 0 }),
            ("m3", Behavior::Hang),
        ],
        fast_config(),
    );

    let result = h
        .engine
        .execute(request(&["m1", "m2", "m3"]), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.per_model.len(), 3);
    let laggard = &result.per_model[2];
    assert!(!laggard.reply.success);
    assert_eq!(laggard.reply.error_kind, Some(ErrorKind::ProviderTimeout));

    // Consensus computed over the two survivors.
    assert!((result.consensus_score - 1.0).abs() < 1e-9);
    assert_eq!(result.consensus_text, "4");
}

#[tokio::test]
async fn all_providers_failing_is_consensus_failed() {
    let h = harness(
        vec![
            ("m1", Behavior::FailHttp { status: 500 }),
            ("m2", Behavior::FailHttp { status: 500 }),
            ("m3", Behavior::FailHttp { status: 500 }),
        ],
        EngineConfig::default(),
    );

    let mut req = request(&["m1", "m2", "m3"]);
    req.enable_caching = true;
    let err = h
        .engine
        .execute(req, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::ConsensusFailed { .. }));
    assert_eq!(err.error_kind(), ErrorKind::ConsensusFailed);

    // Failure row written, nothing cached.
    let rows = h.analytics.queries.lock().unwrap();
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].success);
    assert_eq!(rows[0].error_kind, Some(ErrorKind::ConsensusFailed));
    assert!(h.cache.results.lock().unwrap().is_empty());
}

#[tokio::test]
async fn two_models_one_failure_returns_partial() {
    let h = harness(
        vec![
            ("m1", Behavior::Answer { text: "4", delay_ms: 0 }),
            ("m2", Behavior::FailHttp { status: 400 }),
        ],
        EngineConfig::default(),
    );

    let result = h
        .engine
        .execute(request(&["m1", "m2"]), CancellationToken::new())
        .await
        .unwrap();

    assert!(result.partial);
    assert_eq!(result.consensus_score, 0.0);
    assert_eq!(result.consensus_text, "4");
    assert_eq!(result.per_model.len(), 2);
    assert!(result.per_model[0].reply.success);
    assert!(!result.per_model[1].reply.success);
}

#[tokio::test]
async fn chain_depth_zero_never_refines() {
    let h = harness(
        vec![
            ("m1", Behavior::Answer { text: "Python", delay_ms: 0 }),
            ("m2", Behavior::Answer { text: "JavaScript", delay_ms: 0 }),
        ],
        EngineConfig::default(),
    );

    let mut req = request(&["m1", "m2"]);
    req.method = ConsensusMethod::Chain;
    req.chain_depth = 0;
    let result = h
        .engine
        .execute(req, CancellationToken::new())
        .await
        .unwrap();

    assert!(result.chain_trace.is_none());
}

#[tokio::test]
async fn transient_failure_is_retried_to_success() {
    let h = harness(
        vec![
            ("m1", Behavior::FailThenAnswer { failures: 1, text: "4" }),
            ("m2", Behavior::Answer { text: "4", delay_ms: 0 }),
        ],
        EngineConfig::default(),
    );

    let result = h
        .engine
        .execute(request(&["m1", "m2"]), CancellationToken::new())
        .await
        .unwrap();

    assert!(result.per_model[0].reply.success, "retry should recover");
    assert!((result.consensus_score - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn per_model_order_matches_request_not_completion() {
    let h = harness(
        vec![
            ("m1", Behavior::Answer { text: "slow answer", delay_ms: 120 }),
            ("m2", Behavior::Answer { text: "fast answer", delay_ms: 0 }),
            ("m3", Behavior::Answer { text: "middle answer", delay_ms: 60 }),
        ],
        EngineConfig::default(),
    );

    let result = h
        .engine
        .execute(request(&["m1", "m2", "m3"]), CancellationToken::new())
        .await
        .unwrap();

    let order: Vec<&str> = result
        .per_model
        .iter()
        .map(|a| a.reply.model_id.as_str())
        .collect();
    assert_eq!(order, vec!["m1", "m2", "m3"]);
}

#[tokio::test]
async fn cancellation_aborts_the_request() {
    let h = harness(
        vec![("m1", Behavior::Hang), ("m2", Behavior::Hang)],
        EngineConfig::default(),
    );

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = h
        .engine
        .execute(request(&["m1", "m2"]), cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Canceled));
}

#[tokio::test]
async fn deadline_exhaustion_reports_deadline_exceeded() {
    let h = harness(
        vec![("m1", Behavior::Hang), ("m2", Behavior::Hang)],
        EngineConfig {
            request_timeout: Duration::from_millis(150),
            ..EngineConfig::default()
        },
    );

    let err = h
        .engine
        .execute(request(&["m1", "m2"]), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DeadlineExceeded));
    assert_eq!(err.error_kind(), ErrorKind::DeadlineExceeded);
}

#[tokio::test]
async fn unknown_model_is_an_invalid_request() {
    let h = harness(
        vec![("m1", Behavior::Answer { text: "4", delay_ms: 0 })],
        EngineConfig::default(),
    );

    let err = h
        .engine
        .execute(request(&["m1", "ghost"]), CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.error_kind(), ErrorKind::InvalidRequest);
}

#[tokio::test]
async fn batch_of_one_matches_single_call() {
    let h = harness(
        vec![
            ("m1", Behavior::Answer { text: "4", delay_ms: 0 }),
            ("m2", Behavior::Answer { text: "4", delay_ms: 0 }),
        ],
        EngineConfig::default(),
    );
    let batch = RunBatchUseCase::new(Arc::clone(&h.engine));

    let single = h
        .engine
        .execute(request(&["m1", "m2"]), CancellationToken::new())
        .await
        .unwrap();
    let output = batch
        .execute(vec![request(&["m1", "m2"])], CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output.summary.total, 1);
    assert_eq!(output.summary.successful, 1);
    let entry = &output.results[0];
    let result = entry.result.as_ref().unwrap();
    assert_eq!(result.consensus_text, single.consensus_text);
    assert_eq!(result.models_used, single.models_used);
    assert!((result.consensus_score - single.consensus_score).abs() < 1e-9);
}

#[tokio::test]
async fn batch_isolates_entry_failures() {
    let h = harness(
        vec![
            ("m1", Behavior::Answer { text: "4", delay_ms: 0 }),
            ("m2", Behavior::Answer { text: "4", delay_ms: 0 }),
        ],
        EngineConfig::default(),
    );
    let batch = RunBatchUseCase::new(Arc::clone(&h.engine));

    let good = request(&["m1", "m2"]);
    let bad = request(&["m1", "ghost"]);
    let output = batch
        .execute(vec![good, bad], CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output.summary.total, 2);
    assert_eq!(output.summary.successful, 1);
    assert_eq!(output.summary.failed, 1);
    assert!(output.results[0].success);
    assert!(!output.results[1].success);
    assert_eq!(output.results[1].error_code, Some(ErrorKind::InvalidRequest));
}
