//! Run Consensus use case
//!
//! Orchestrates the full consensus flow: fingerprint and cache lookup, prompt
//! rendering, parallel provider fan-out under one shared deadline, agreement
//! scoring over answer embeddings, optional chain refinement, and
//! finalisation with write-through caching and fire-and-forget analytics.

use crate::ports::analytics::Analytics;
use crate::ports::cache::ConsensusCache;
use crate::ports::embedder::Embedder;
use crate::ports::provider::{Provider, ProviderRegistry};
use chrono::Utc;
use crossmind_domain::{
    request_fingerprint, scoring, text_hash, CatalogError, ChainRound, ConsensusMethod,
    ConsensusRequest, ConsensusResult, ErrorKind, ModelAnswer, ModelCatalog, ModelDescriptor,
    PromptRegistry, ProviderCall, ProviderKind, ProviderReply, QueryAnalyticsRecord,
    RequestValidationError,
};
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Slack granted past the shared deadline for cooperative adapters to wind
/// down before their tasks are abandoned outright.
const DEADLINE_GRACE: Duration = Duration::from_millis(50);

/// Tunables for the engine, wired from configuration at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Shared budget for one request, fan-out and refinement included.
    pub request_timeout: Duration,
    /// How many times a transient per-call failure may be re-queued.
    pub max_retries: u32,
    /// Minimum successful replies for a valid consensus.
    pub min_success: usize,
    /// Agreement below this triggers refinement.
    pub low_consensus_threshold: f64,
    /// Agreement at or above this is reported as high confidence.
    pub high_consensus_threshold: f64,
    /// TTL for cached results.
    pub cache_ttl: Duration,
    /// TTL for cached embeddings.
    pub embedding_cache_ttl: Duration,
    /// Upper bound on fan-out width per request.
    pub max_fanout: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_retries: 2,
            min_success: 2,
            low_consensus_threshold: 0.85,
            high_consensus_threshold: 0.90,
            cache_ttl: Duration::from_secs(3600),
            embedding_cache_ttl: Duration::from_secs(86_400),
            max_fanout: 10,
        }
    }
}

/// Errors that can end a consensus query
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    InvalidRequest(#[from] RequestValidationError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("no adapter registered for provider kind {0}")]
    NoAdapter(ProviderKind),

    #[error("fan-out width {got} exceeds the configured cap of {cap}")]
    FanOutTooWide { got: usize, cap: usize },

    #[error("only {successes} of {required} required provider replies succeeded")]
    ConsensusFailed { successes: usize, required: usize },

    #[error("request deadline exceeded before enough replies arrived")]
    DeadlineExceeded,

    #[error("request canceled")]
    Canceled,

    #[error("embedding failed: {0}")]
    Embedding(String),
}

impl EngineError {
    /// Error kind the router translates to a status code.
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            EngineError::Catalog(_) => ErrorKind::InvalidRequest,
            EngineError::NoAdapter(_) => ErrorKind::Internal,
            EngineError::FanOutTooWide { .. } => ErrorKind::InvalidRequest,
            EngineError::ConsensusFailed { .. } => ErrorKind::ConsensusFailed,
            EngineError::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            EngineError::Canceled => ErrorKind::Canceled,
            EngineError::Embedding(_) => ErrorKind::Internal,
        }
    }
}

/// Use case for answering one question by multi-provider consensus
pub struct RunConsensusUseCase {
    providers: Arc<ProviderRegistry>,
    embedder: Arc<dyn Embedder>,
    cache: Arc<dyn ConsensusCache>,
    analytics: Arc<dyn Analytics>,
    catalog: Arc<ModelCatalog>,
    config: EngineConfig,
}

impl RunConsensusUseCase {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        embedder: Arc<dyn Embedder>,
        cache: Arc<dyn ConsensusCache>,
        analytics: Arc<dyn Analytics>,
        catalog: Arc<ModelCatalog>,
        config: EngineConfig,
    ) -> Self {
        Self {
            providers,
            embedder,
            cache,
            analytics,
            catalog,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute one consensus query.
    ///
    /// Cancelling the token (client disconnect, shutdown) propagates to every
    /// in-flight provider call and refinement round.
    pub async fn execute(
        &self,
        request: ConsensusRequest,
        cancel: CancellationToken,
    ) -> Result<ConsensusResult, EngineError> {
        request.validate()?;

        let started = Instant::now();
        let fingerprint = request_fingerprint(&request);

        if request.enable_caching {
            if let Some(mut cached) = self.cache.get_result(&fingerprint).await {
                debug!(fingerprint = %fingerprint, "serving consensus from cache");
                cached.cache_hit = true;
                cached.total_latency = started.elapsed();
                self.analytics
                    .record_query(self.query_record(&cached, &fingerprint));
                return Ok(cached);
            }
        }

        let snapshot = self.catalog.snapshot();
        let mut selected = Vec::with_capacity(request.selected_model_ids.len());
        for id in &request.selected_model_ids {
            selected.push(snapshot.resolve_enabled(id)?);
        }
        if selected.len() > self.config.max_fanout {
            return Err(EngineError::FanOutTooWide {
                got: selected.len(),
                cap: self.config.max_fanout,
            });
        }

        let weights = scoring::normalized_weights(request.weights.as_deref(), selected.len());
        let deadline = started + self.config.request_timeout;

        info!(
            models = selected.len(),
            method = %request.method,
            "starting consensus fan-out"
        );
        let replies = self.fan_out(&request, &selected, deadline, &cancel).await?;

        if cancel.is_cancelled() {
            self.record_failure(&request, &fingerprint, &replies, started, ErrorKind::Canceled);
            return Err(EngineError::Canceled);
        }

        let success_indices: Vec<usize> = replies
            .iter()
            .enumerate()
            .filter(|(_, r)| r.success)
            .map(|(i, _)| i)
            .collect();

        if success_indices.len() < self.config.min_success {
            // Two-model queries degrade gracefully: the surviving reply is
            // returned with a zero score and a partial flag.
            if replies.len() == 2 && success_indices.len() == 1 {
                let result = self.assemble_partial(
                    &request,
                    &fingerprint,
                    replies,
                    &weights,
                    success_indices[0],
                    started,
                );
                return Ok(result);
            }

            // Per-call slices end at the shared deadline, so a timeout or an
            // abandoned call means the request budget ran out; anything else
            // is the providers' own failure.
            let deadline_blown = replies.iter().any(|r| {
                matches!(
                    r.error_kind,
                    Some(ErrorKind::Canceled) | Some(ErrorKind::ProviderTimeout)
                )
            });
            let err = if deadline_blown {
                EngineError::DeadlineExceeded
            } else {
                EngineError::ConsensusFailed {
                    successes: success_indices.len(),
                    required: self.config.min_success,
                }
            };
            self.record_failure(&request, &fingerprint, &replies, started, err.error_kind());
            return Err(err);
        }

        // Embed every successful answer, re-using the embedding cache.
        let mut embeddings = Vec::with_capacity(success_indices.len());
        for &idx in &success_indices {
            embeddings.push(self.embedding_for(&replies[idx].text).await?);
        }
        let sub_weights: Vec<f64> = success_indices.iter().map(|&i| weights[i]).collect();

        let all_identical = success_indices
            .windows(2)
            .all(|pair| replies[pair[0]].text == replies[pair[1]].text);

        let mut score = if all_identical {
            1.0
        } else {
            scoring::agreement_score(&embeddings, &sub_weights)
        };
        let individual = scoring::individual_agreements(&embeddings, &sub_weights);
        let best_pos = scoring::select_consensus(&individual);
        let mut consensus_text = replies[success_indices[best_pos]].text.clone();
        let initial_score = score;

        let mut chain_trace = Vec::new();
        let should_refine = request.chain_depth > 0
            && !all_identical
            && (request.method == ConsensusMethod::Chain
                || score < self.config.low_consensus_threshold);
        if should_refine {
            chain_trace = self
                .refine(
                    &request,
                    &selected,
                    &mut embeddings,
                    &sub_weights,
                    best_pos,
                    &mut consensus_text,
                    &mut score,
                    deadline,
                    &cancel,
                )
                .await;
        }

        let quality_metrics = self.quality_metrics(
            &request,
            &replies,
            &success_indices,
            &individual,
            &chain_trace,
            initial_score,
        );

        let per_model = Self::per_model_answers(&request, replies, &weights, &success_indices, &individual);

        let result = ConsensusResult {
            consensus_id: uuid::Uuid::new_v4().to_string(),
            consensus_text,
            consensus_score: score.clamp(0.0, 1.0),
            per_model,
            method_used: request.method,
            models_used: request.selected_model_ids.clone(),
            cache_hit: false,
            total_latency: started.elapsed(),
            chain_trace: (!chain_trace.is_empty()).then_some(chain_trace),
            quality_metrics: (!quality_metrics.is_empty()).then_some(quality_metrics),
            partial: false,
            verdict: ConsensusResult::verdict_for(
                score,
                self.config.low_consensus_threshold,
                self.config.high_consensus_threshold,
            )
            .to_string(),
        };

        if request.enable_caching {
            self.cache
                .put_result(&fingerprint, &result, self.config.cache_ttl)
                .await;
        }
        self.analytics
            .record_query(self.query_record(&result, &fingerprint));

        info!(
            score = result.consensus_score,
            latency_ms = result.total_latency.as_millis() as u64,
            "consensus assembled"
        );
        Ok(result)
    }

    /// Dispatch one call per selected model, all sharing the same deadline
    /// instant. Stragglers past the deadline (plus a short grace) are
    /// abandoned and reported as canceled.
    async fn fan_out(
        &self,
        request: &ConsensusRequest,
        selected: &[Arc<ModelDescriptor>],
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<Vec<ProviderReply>, EngineError> {
        let fan_out_started = Instant::now();
        let mut join_set = JoinSet::new();

        for (idx, descriptor) in selected.iter().enumerate() {
            let provider = self
                .providers
                .resolve(descriptor.provider_kind)
                .ok_or(EngineError::NoAdapter(descriptor.provider_kind))?;
            let call = ProviderCall {
                descriptor: Arc::clone(descriptor),
                prompt: PromptRegistry::answer_prompt(
                    &request.question,
                    request.role_for(idx),
                    request.method,
                    request
                        .enable_chain_of_thought
                        .then_some(request.reasoning_method),
                ),
                temperature: request.temperature,
                deadline,
                attempt: 1,
            };
            let cancel = cancel.clone();
            let max_retries = self.config.max_retries;
            join_set
                .spawn(async move { (idx, call_with_retry(provider, call, cancel, max_retries).await) });
        }

        let grace = tokio::time::Instant::from_std(deadline) + DEADLINE_GRACE;
        let mut slots: Vec<Option<ProviderReply>> = vec![None; selected.len()];
        let mut aborted = false;
        loop {
            tokio::select! {
                biased;
                joined = join_set.join_next() => match joined {
                    None => break,
                    Some(Ok((idx, reply))) => slots[idx] = Some(reply),
                    Some(Err(e)) => {
                        if !e.is_cancelled() {
                            warn!("fan-out task failed: {e}");
                        }
                    }
                },
                _ = cancel.cancelled(), if !aborted => {
                    join_set.abort_all();
                    aborted = true;
                }
                _ = tokio::time::sleep_until(grace), if !aborted => {
                    join_set.abort_all();
                    aborted = true;
                }
            }
        }

        let replies = slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.unwrap_or_else(|| {
                    ProviderReply::failure(
                        selected[idx].id.clone(),
                        ErrorKind::Canceled,
                        "call abandoned at the shared deadline",
                        fan_out_started.elapsed(),
                    )
                })
            })
            .collect();
        Ok(replies)
    }

    /// Critique-and-revise rounds. Each round gets a sub-deadline carved from
    /// the remaining budget; a revision replaces the consensus only when the
    /// re-scored agreement does not decrease.
    #[allow(clippy::too_many_arguments)]
    async fn refine(
        &self,
        request: &ConsensusRequest,
        selected: &[Arc<ModelDescriptor>],
        embeddings: &mut [Vec<f32>],
        sub_weights: &[f64],
        best_pos: usize,
        consensus_text: &mut String,
        score: &mut f64,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Vec<ChainRound> {
        let n = selected.len();
        let mut trace = Vec::new();

        for k in 0..request.chain_depth {
            if cancel.is_cancelled() {
                break;
            }
            let now = Instant::now();
            let remaining = deadline.saturating_duration_since(now);
            if remaining.is_zero() {
                debug!("refinement budget exhausted after {k} rounds");
                break;
            }
            let rounds_left = (request.chain_depth - k) as u32;
            let sub_deadline = now + remaining / (rounds_left + 1);

            let critic = &selected[(k as usize + 1) % n];
            let reviser = &selected[(k as usize + 2) % n];

            let critique = match self
                .single_call(
                    critic,
                    PromptRegistry::critic_prompt(&request.question, consensus_text),
                    request.temperature,
                    sub_deadline,
                    cancel,
                )
                .await
            {
                Some(text) => text,
                None => break,
            };
            let revised = match self
                .single_call(
                    reviser,
                    PromptRegistry::reviser_prompt(&request.question, consensus_text, &critique),
                    request.temperature,
                    sub_deadline,
                    cancel,
                )
                .await
            {
                Some(text) => text,
                None => break,
            };

            let revised_embedding = match self.embedding_for(&revised).await {
                Ok(embedding) => embedding,
                Err(e) => {
                    warn!("refinement embedding failed: {e}");
                    break;
                }
            };

            let mut candidate: Vec<Vec<f32>> = embeddings.to_vec();
            candidate[best_pos] = revised_embedding.clone();
            let new_score = scoring::agreement_score(&candidate, sub_weights);
            let accepted = new_score >= *score - scoring::SCORE_EPSILON;
            if accepted {
                *consensus_text = revised.clone();
                *score = new_score;
                embeddings[best_pos] = revised_embedding;
            }

            debug!(
                round = k + 1,
                critic = %critic.id,
                reviser = %reviser.id,
                new_score,
                accepted,
                "chain refinement round"
            );
            trace.push(ChainRound {
                round: k + 1,
                critic_id: critic.id.clone(),
                critique,
                reviser_id: reviser.id.clone(),
                revised_text: revised,
                new_score,
                accepted,
            });
        }
        trace
    }

    /// One bounded provider call used by refinement rounds.
    async fn single_call(
        &self,
        descriptor: &Arc<ModelDescriptor>,
        prompt: String,
        temperature: f64,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let provider = self.providers.resolve(descriptor.provider_kind)?;
        let call = ProviderCall {
            descriptor: Arc::clone(descriptor),
            prompt,
            temperature,
            deadline,
            attempt: 1,
        };
        let reply = call_with_retry(provider, call, cancel.clone(), self.config.max_retries).await;
        if reply.success {
            Some(reply.text)
        } else {
            warn!(
                model = %descriptor.id,
                kind = ?reply.error_kind,
                "refinement call failed"
            );
            None
        }
    }

    /// Embedding for a text, via the cache.
    async fn embedding_for(&self, text: &str) -> Result<Vec<f32>, EngineError> {
        let hash = text_hash(text);
        if let Some(vector) = self.cache.get_embedding(&hash).await {
            return Ok(vector);
        }
        let vector = self
            .embedder
            .embed(text)
            .await
            .map_err(|e| EngineError::Embedding(e.to_string()))?;
        self.cache
            .put_embedding(&hash, &vector, self.config.embedding_cache_ttl)
            .await;
        Ok(vector)
    }

    /// Result for the two-model/one-failure degradation.
    fn assemble_partial(
        &self,
        request: &ConsensusRequest,
        fingerprint: &str,
        replies: Vec<ProviderReply>,
        weights: &[f64],
        survivor: usize,
        started: Instant,
    ) -> ConsensusResult {
        let consensus_text = replies[survivor].text.clone();
        let mut quality_metrics = BTreeMap::new();
        if replies.iter().any(|r| r.tokens_estimated) {
            quality_metrics.insert("token_estimate".to_string(), serde_json::Value::Bool(true));
        }

        let per_model = Self::per_model_answers(request, replies, weights, &[survivor], &[1.0]);
        let result = ConsensusResult {
            consensus_id: uuid::Uuid::new_v4().to_string(),
            consensus_text,
            consensus_score: 0.0,
            per_model,
            method_used: request.method,
            models_used: request.selected_model_ids.clone(),
            cache_hit: false,
            total_latency: started.elapsed(),
            chain_trace: None,
            quality_metrics: (!quality_metrics.is_empty()).then_some(quality_metrics),
            partial: true,
            verdict: ConsensusResult::verdict_for(
                0.0,
                self.config.low_consensus_threshold,
                self.config.high_consensus_threshold,
            )
            .to_string(),
        };
        self.analytics
            .record_query(self.query_record(&result, fingerprint));
        result
    }

    fn per_model_answers(
        request: &ConsensusRequest,
        replies: Vec<ProviderReply>,
        weights: &[f64],
        success_indices: &[usize],
        individual: &[f64],
    ) -> Vec<ModelAnswer> {
        let agreement_by_idx: BTreeMap<usize, f64> = success_indices
            .iter()
            .copied()
            .zip(individual.iter().copied())
            .collect();

        replies
            .into_iter()
            .enumerate()
            .map(|(idx, reply)| {
                let mut answer = ModelAnswer::new(reply, weights[idx])
                    .with_role(request.role_for(idx).map(str::to_string));
                if let Some(&agreement) = agreement_by_idx.get(&idx) {
                    answer = answer.with_pairwise_score(agreement);
                }
                answer
            })
            .collect()
    }

    fn quality_metrics(
        &self,
        _request: &ConsensusRequest,
        replies: &[ProviderReply],
        success_indices: &[usize],
        individual: &[f64],
        chain_trace: &[ChainRound],
        initial_score: f64,
    ) -> BTreeMap<String, serde_json::Value> {
        let mut metrics = BTreeMap::new();
        if replies.iter().any(|r| r.tokens_estimated) {
            metrics.insert("token_estimate".to_string(), serde_json::Value::Bool(true));
        }

        let suggestion = scoring::suggested_weights(individual);
        let mut suggested = serde_json::Map::new();
        for (&idx, weight) in success_indices.iter().zip(suggestion) {
            if let Some(number) = serde_json::Number::from_f64(weight) {
                suggested.insert(
                    replies[idx].model_id.clone(),
                    serde_json::Value::Number(number),
                );
            }
        }
        if !suggested.is_empty() {
            metrics.insert(
                "suggested_weights".to_string(),
                serde_json::Value::Object(suggested),
            );
        }

        if !chain_trace.is_empty() {
            metrics.insert(
                "chain_rounds".to_string(),
                serde_json::Value::Number(chain_trace.len().into()),
            );
            if let Some(number) = serde_json::Number::from_f64(initial_score) {
                metrics.insert(
                    "initial_consensus_score".to_string(),
                    serde_json::Value::Number(number),
                );
            }
        }
        metrics
    }

    /// Analytics row for a served result (fresh, partial, or cached).
    fn query_record(&self, result: &ConsensusResult, fingerprint: &str) -> QueryAnalyticsRecord {
        let snapshot = self.catalog.snapshot();
        let mut per_model_latency = BTreeMap::new();
        let mut per_model_success = BTreeMap::new();
        let mut per_model_agreement = BTreeMap::new();
        let mut cost_estimate = 0.0;

        for answer in &result.per_model {
            let id = answer.reply.model_id.clone();
            per_model_latency.insert(id.clone(), answer.reply.latency.as_secs_f64());
            per_model_success.insert(id.clone(), answer.reply.success);
            if let Some(agreement) = answer.pairwise_score {
                per_model_agreement.insert(id.clone(), agreement);
            }
            if let Some(descriptor) = snapshot.get(&answer.reply.model_id) {
                cost_estimate += descriptor
                    .cost_estimate(answer.reply.prompt_tokens, answer.reply.completion_tokens);
            }
        }
        // A cache hit spends nothing on providers.
        if result.cache_hit {
            cost_estimate = 0.0;
        }

        QueryAnalyticsRecord {
            query_id: result.consensus_id.clone(),
            timestamp: Utc::now(),
            fingerprint: fingerprint.to_string(),
            method: result.method_used,
            consensus_score: result.consensus_score,
            total_latency_secs: result.total_latency.as_secs_f64(),
            success: true,
            error_kind: None,
            cache_hit: result.cache_hit,
            per_model_latency,
            per_model_success,
            per_model_agreement,
            cost_estimate,
        }
    }

    /// Analytics row for a query that produced no result.
    fn record_failure(
        &self,
        request: &ConsensusRequest,
        fingerprint: &str,
        replies: &[ProviderReply],
        started: Instant,
        kind: ErrorKind,
    ) {
        let mut per_model_latency = BTreeMap::new();
        let mut per_model_success = BTreeMap::new();
        for reply in replies {
            per_model_latency.insert(reply.model_id.clone(), reply.latency.as_secs_f64());
            per_model_success.insert(reply.model_id.clone(), reply.success);
        }

        self.analytics.record_query(QueryAnalyticsRecord {
            query_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            fingerprint: fingerprint.to_string(),
            method: request.method,
            consensus_score: 0.0,
            total_latency_secs: started.elapsed().as_secs_f64(),
            success: false,
            error_kind: Some(kind),
            cache_hit: false,
            per_model_latency,
            per_model_success,
            per_model_agreement: BTreeMap::new(),
            cost_estimate: 0.0,
        });
    }
}

/// Invoke an adapter, re-queueing transient failures with jittered
/// exponential backoff while the shared deadline allows. Retry policy lives
/// here, not in the adapters, so it can be observed centrally.
async fn call_with_retry(
    provider: Arc<dyn Provider>,
    mut call: ProviderCall,
    cancel: CancellationToken,
    max_retries: u32,
) -> ProviderReply {
    loop {
        let attempt_started = Instant::now();
        let deadline = tokio::time::Instant::from_std(call.deadline);

        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return ProviderReply::failure(
                    call.model_id(),
                    ErrorKind::Canceled,
                    "request canceled",
                    attempt_started.elapsed(),
                );
            }
            outcome = tokio::time::timeout_at(deadline, provider.invoke(&call)) => match outcome {
                Ok(reply) => reply,
                Err(_) => ProviderReply::failure(
                    call.model_id(),
                    ErrorKind::ProviderTimeout,
                    "deadline slice elapsed",
                    attempt_started.elapsed(),
                ),
            }
        };

        if reply.success || !reply.is_transient() || call.attempt > max_retries {
            return reply;
        }

        let backoff = backoff_delay(call.attempt);
        if Instant::now() + backoff >= call.deadline {
            debug!(model = call.model_id(), "no budget left for another attempt");
            return reply;
        }
        warn!(
            model = call.model_id(),
            attempt = call.attempt,
            backoff_ms = backoff.as_millis() as u64,
            "transient provider failure, re-queueing"
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return ProviderReply::failure(
                    call.model_id(),
                    ErrorKind::Canceled,
                    "request canceled during backoff",
                    attempt_started.elapsed(),
                );
            }
            _ = tokio::time::sleep(backoff) => {}
        }
        call = call.next_attempt();
    }
}

/// `100 ms × 2^attempt`, jittered ±25 %.
fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = 100u64.saturating_mul(1u64 << attempt.min(10));
    let jitter = rand::thread_rng().gen_range(0.75..=1.25);
    Duration::from_millis((base_ms as f64 * jitter) as u64)
}
