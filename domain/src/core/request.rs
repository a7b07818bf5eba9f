//! Validated consensus requests.
//!
//! A [`ConsensusRequest`] is the normalised input after transport-level
//! parsing. Construction goes through [`ConsensusRequest::validate`], so the
//! engine can rely on its invariants (question bounds, model count, weight
//! shape) without re-checking.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Maximum question length accepted by the engine.
pub const MAX_QUESTION_CHARS: usize = 5_000;
/// Inclusive bounds on the number of models per query.
pub const MIN_MODELS: usize = 2;
pub const MAX_MODELS: usize = 10;
/// Maximum refinement depth.
pub const MAX_CHAIN_DEPTH: u8 = 5;

/// How the prompt is framed for each participating model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsensusMethod {
    /// Each model answers in an assigned expert role.
    #[default]
    ExpertRoles,
    /// Every model gets the same neutral prompt.
    DirectConsensus,
    /// Models are asked to argue their strongest position.
    Debate,
    /// Refinement rounds always run after the initial fan-out.
    Chain,
}

impl ConsensusMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsensusMethod::ExpertRoles => "expert_roles",
            ConsensusMethod::DirectConsensus => "direct_consensus",
            ConsensusMethod::Debate => "debate",
            ConsensusMethod::Chain => "chain",
        }
    }
}

impl std::fmt::Display for ConsensusMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ConsensusMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "expert_roles" => ConsensusMethod::ExpertRoles,
            "direct_consensus" => ConsensusMethod::DirectConsensus,
            "debate" => ConsensusMethod::Debate,
            "chain" => ConsensusMethod::Chain,
            other => return Err(format!("unknown consensus method: {other}")),
        })
    }
}

impl Serialize for ConsensusMethod {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ConsensusMethod {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Scaffold applied when chain-of-thought prompting is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReasoningMethod {
    #[default]
    ChainOfThought,
    SocraticMethod,
    MultiPerspective,
}

impl ReasoningMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningMethod::ChainOfThought => "chain_of_thought",
            ReasoningMethod::SocraticMethod => "socratic_method",
            ReasoningMethod::MultiPerspective => "multi_perspective",
        }
    }
}

impl std::str::FromStr for ReasoningMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "chain_of_thought" => ReasoningMethod::ChainOfThought,
            "socratic_method" => ReasoningMethod::SocraticMethod,
            "multi_perspective" => ReasoningMethod::MultiPerspective,
            other => return Err(format!("unknown reasoning method: {other}")),
        })
    }
}

impl Serialize for ReasoningMethod {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ReasoningMethod {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Why a request failed validation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestValidationError {
    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("question exceeds {MAX_QUESTION_CHARS} characters")]
    QuestionTooLong,

    #[error("between {MIN_MODELS} and {MAX_MODELS} models required, got {0}")]
    ModelCount(usize),

    #[error("duplicate model id in selection: {0}")]
    DuplicateModel(String),

    #[error("temperature must be within 0.0..=2.0, got {0}")]
    TemperatureOutOfRange(f64),

    #[error("weights length {got} does not match model count {expected}")]
    WeightsLength { got: usize, expected: usize },

    #[error("weights must be positive, got {0}")]
    NonPositiveWeight(f64),

    #[error("chain depth must be at most {MAX_CHAIN_DEPTH}, got {0}")]
    ChainDepthOutOfRange(u8),
}

/// The normalised input to the consensus engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusRequest {
    pub question: String,
    /// Role labels assigned round-robin to models; may be empty.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Enabled descriptor ids, fan-out order.
    pub selected_model_ids: Vec<String>,
    #[serde(default)]
    pub method: ConsensusMethod,
    pub temperature: f64,
    /// Per-model weights aligned with `selected_model_ids`; normalised by the
    /// engine to sum to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
    pub chain_depth: u8,
    #[serde(default)]
    pub enable_chain_of_thought: bool,
    #[serde(default)]
    pub reasoning_method: ReasoningMethod,
    pub enable_caching: bool,
}

impl ConsensusRequest {
    /// Check every invariant the engine relies on.
    pub fn validate(&self) -> Result<(), RequestValidationError> {
        let trimmed = self.question.trim();
        if trimmed.is_empty() {
            return Err(RequestValidationError::EmptyQuestion);
        }
        if self.question.chars().count() > MAX_QUESTION_CHARS {
            return Err(RequestValidationError::QuestionTooLong);
        }

        let n = self.selected_model_ids.len();
        if !(MIN_MODELS..=MAX_MODELS).contains(&n) {
            return Err(RequestValidationError::ModelCount(n));
        }
        let mut seen = std::collections::HashSet::with_capacity(n);
        for id in &self.selected_model_ids {
            if !seen.insert(id.as_str()) {
                return Err(RequestValidationError::DuplicateModel(id.clone()));
            }
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(RequestValidationError::TemperatureOutOfRange(
                self.temperature,
            ));
        }

        if let Some(weights) = &self.weights {
            if weights.len() != n {
                return Err(RequestValidationError::WeightsLength {
                    got: weights.len(),
                    expected: n,
                });
            }
            for &w in weights {
                if !(w.is_finite() && w > 0.0) {
                    return Err(RequestValidationError::NonPositiveWeight(w));
                }
            }
        }

        if self.chain_depth > MAX_CHAIN_DEPTH {
            return Err(RequestValidationError::ChainDepthOutOfRange(
                self.chain_depth,
            ));
        }

        Ok(())
    }

    /// Role assigned to the model at `index`, wrapping when there are fewer
    /// roles than models. `None` when no roles were supplied.
    pub fn role_for(&self, index: usize) -> Option<&str> {
        if self.roles.is_empty() {
            None
        } else {
            Some(self.roles[index % self.roles.len()].as_str())
        }
    }
}
