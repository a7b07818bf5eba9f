//! Consensus result value objects.
//!
//! These types are the engine's output contract: one [`ModelAnswer`] per
//! selected model in request order, an optional [`ChainRound`] trace when
//! refinement ran, and the assembled [`ConsensusResult`] that is cached and
//! returned verbatim.

use crate::consensus::reply::ProviderReply;
use crate::core::request::ConsensusMethod;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// A provider reply enriched with its scoring context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelAnswer {
    #[serde(flatten)]
    pub reply: ProviderReply,
    /// Normalised weight used for this model.
    pub weight: f64,
    /// Individual agreement `a_i`; absent for failed replies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairwise_score: Option<f64>,
    /// Role the model answered in, when roles were assigned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl ModelAnswer {
    pub fn new(reply: ProviderReply, weight: f64) -> Self {
        Self {
            reply,
            weight,
            pairwise_score: None,
            role: None,
        }
    }

    pub fn with_pairwise_score(mut self, score: f64) -> Self {
        self.pairwise_score = Some(score);
        self
    }

    pub fn with_role(mut self, role: Option<String>) -> Self {
        self.role = role;
        self
    }
}

/// One critique-and-revise refinement round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainRound {
    /// 1-based round number.
    pub round: u8,
    pub critic_id: String,
    pub critique: String,
    pub reviser_id: String,
    pub revised_text: String,
    /// Agreement score of the revised answer against the original set.
    pub new_score: f64,
    /// Whether the revision replaced the consensus text.
    pub accepted: bool,
}

/// The returned artifact of a consensus query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    /// Opaque id correlating feedback with this result.
    pub consensus_id: String,
    pub consensus_text: String,
    /// Agreement score in `[0, 1]`.
    pub consensus_score: f64,
    /// One entry per selected model, in request order.
    pub per_model: Vec<ModelAnswer>,
    pub method_used: ConsensusMethod,
    pub models_used: Vec<String>,
    pub cache_hit: bool,
    #[serde(with = "crate::util::duration_secs")]
    pub total_latency: Duration,
    /// Present iff at least one refinement round executed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_trace: Option<Vec<ChainRound>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_metrics: Option<BTreeMap<String, serde_json::Value>>,
    /// Set when only one of two models survived; the score is 0 by contract.
    #[serde(default, skip_serializing_if = "crate::util::is_false")]
    pub partial: bool,
    /// Human-readable confidence verdict derived from the thresholds.
    pub verdict: String,
}

impl ConsensusResult {
    /// Confidence verdict for a score given the configured thresholds.
    pub fn verdict_for(score: f64, low_threshold: f64, high_threshold: f64) -> &'static str {
        if score >= high_threshold {
            "high agreement"
        } else if score >= low_threshold {
            "moderate agreement"
        } else {
            "low agreement, further verification advised"
        }
    }

    /// Successful replies in request order.
    pub fn successful_answers(&self) -> impl Iterator<Item = &ModelAnswer> {
        self.per_model.iter().filter(|a| a.reply.success)
    }

    /// Failed replies in request order.
    pub fn failed_answers(&self) -> impl Iterator<Item = &ModelAnswer> {
        self.per_model.iter().filter(|a| !a.reply.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    fn result_with(replies: Vec<ProviderReply>) -> ConsensusResult {
        let models_used = replies.iter().map(|r| r.model_id.clone()).collect();
        ConsensusResult {
            consensus_id: "c-1".to_string(),
            consensus_text: "4".to_string(),
            consensus_score: 1.0,
            per_model: replies
                .into_iter()
                .map(|r| ModelAnswer::new(r, 0.5))
                .collect(),
            method_used: ConsensusMethod::DirectConsensus,
            models_used,
            cache_hit: false,
            total_latency: Duration::from_millis(120),
            chain_trace: None,
            quality_metrics: None,
            partial: false,
            verdict: "high agreement".to_string(),
        }
    }

    #[test]
    fn verdict_thresholds() {
        assert_eq!(
            ConsensusResult::verdict_for(0.95, 0.85, 0.90),
            "high agreement"
        );
        assert_eq!(
            ConsensusResult::verdict_for(0.87, 0.85, 0.90),
            "moderate agreement"
        );
        assert_eq!(
            ConsensusResult::verdict_for(0.3, 0.85, 0.90),
            "low agreement, further verification advised"
        );
    }

    #[test]
    fn successful_and_failed_partition() {
        let result = result_with(vec![
            ProviderReply::success("m1", "4", Duration::ZERO),
            ProviderReply::failure("m2", ErrorKind::ProviderTimeout, "slow", Duration::ZERO),
        ]);
        assert_eq!(result.successful_answers().count(), 1);
        assert_eq!(result.failed_answers().count(), 1);
    }

    #[test]
    fn absent_optionals_are_omitted_from_json() {
        let result = result_with(vec![ProviderReply::success("m1", "4", Duration::ZERO)]);
        let json = serde_json::to_value(&result).unwrap();
        let object = json.as_object().unwrap();
        assert!(!object.contains_key("chain_trace"));
        assert!(!object.contains_key("quality_metrics"));
        assert!(!object.contains_key("partial"));
        assert!(object.contains_key("consensus_text"));
    }

    #[test]
    fn partial_flag_serialises_when_set() {
        let mut result = result_with(vec![ProviderReply::success("m1", "4", Duration::ZERO)]);
        result.partial = true;
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["partial"], serde_json::Value::Bool(true));
    }

    #[test]
    fn result_json_roundtrips() {
        let result = result_with(vec![ProviderReply::success("m1", "4", Duration::ZERO)]);
        let json = serde_json::to_string(&result).unwrap();
        let back: ConsensusResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.consensus_text, result.consensus_text);
        assert_eq!(back.per_model.len(), 1);
        assert_eq!(back.total_latency, result.total_latency);
    }
}
