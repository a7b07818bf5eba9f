//! Run Batch use case
//!
//! Executes up to fifty consensus queries concurrently and reports per-entry
//! outcomes with a batch summary. A batch of one is field-for-field
//! equivalent to a single consensus call with the same body.

use crate::use_cases::run_consensus::{EngineError, RunConsensusUseCase};
use crossmind_domain::{ConsensusRequest, ConsensusResult, ErrorKind};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Hard cap on entries per batch.
pub const MAX_BATCH_SIZE: usize = 50;

/// Errors that reject a whole batch
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("batch holds {0} entries, maximum is {MAX_BATCH_SIZE}")]
    TooManyEntries(usize),

    #[error("batch holds no entries")]
    Empty,
}

/// Outcome of one batch entry, in submission order.
#[derive(Debug, Serialize)]
pub struct BatchEntryOutcome {
    pub question: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ConsensusResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Aggregate counts for the whole batch.
#[derive(Debug, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_latency_secs: f64,
    pub avg_latency_secs: f64,
}

/// Batch response payload.
#[derive(Debug, Serialize)]
pub struct BatchOutput {
    pub results: Vec<BatchEntryOutcome>,
    pub summary: BatchSummary,
}

/// Use case for processing a batch of consensus queries
pub struct RunBatchUseCase {
    engine: Arc<RunConsensusUseCase>,
}

impl RunBatchUseCase {
    pub fn new(engine: Arc<RunConsensusUseCase>) -> Self {
        Self { engine }
    }

    /// Run every entry concurrently; one entry failing never fails the batch.
    pub async fn execute(
        &self,
        requests: Vec<ConsensusRequest>,
        cancel: CancellationToken,
    ) -> Result<BatchOutput, BatchError> {
        if requests.is_empty() {
            return Err(BatchError::Empty);
        }
        if requests.len() > MAX_BATCH_SIZE {
            return Err(BatchError::TooManyEntries(requests.len()));
        }

        let started = Instant::now();
        let total = requests.len();
        info!(entries = total, "starting batch consensus");

        let mut join_set = JoinSet::new();
        let mut questions = Vec::with_capacity(total);
        for (idx, request) in requests.into_iter().enumerate() {
            questions.push(request.question.clone());
            let engine = Arc::clone(&self.engine);
            let cancel = cancel.child_token();
            join_set.spawn(async move { (idx, engine.execute(request, cancel).await) });
        }

        let mut slots: Vec<Option<Result<ConsensusResult, EngineError>>> =
            (0..total).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, outcome)) => slots[idx] = Some(outcome),
                Err(e) => warn!("batch entry task failed: {e}"),
            }
        }

        let mut results = Vec::with_capacity(total);
        let mut successful = 0;
        for (idx, slot) in slots.into_iter().enumerate() {
            let question = questions[idx].clone();
            match slot {
                Some(Ok(result)) => {
                    successful += 1;
                    results.push(BatchEntryOutcome {
                        question,
                        success: true,
                        result: Some(result),
                        error_code: None,
                        error_message: None,
                    });
                }
                Some(Err(err)) => results.push(BatchEntryOutcome {
                    question,
                    success: false,
                    result: None,
                    error_code: Some(err.error_kind()),
                    error_message: Some(err.to_string()),
                }),
                None => results.push(BatchEntryOutcome {
                    question,
                    success: false,
                    result: None,
                    error_code: Some(ErrorKind::Internal),
                    error_message: Some("batch entry task vanished".to_string()),
                }),
            }
        }

        let total_latency_secs = started.elapsed().as_secs_f64();
        let summary = BatchSummary {
            total,
            successful,
            failed: total - successful,
            total_latency_secs,
            avg_latency_secs: total_latency_secs / total as f64,
        };
        Ok(BatchOutput { results, summary })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_cap_is_fifty() {
        assert_eq!(MAX_BATCH_SIZE, 50);
    }

    #[test]
    fn outcome_serialisation_omits_absent_fields() {
        let outcome = BatchEntryOutcome {
            question: "q".to_string(),
            success: false,
            result: None,
            error_code: Some(ErrorKind::ConsensusFailed),
            error_message: Some("nope".to_string()),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert!(json.get("result").is_none());
        assert_eq!(json["error_code"], "consensus_failed");
    }
}
