//! Prompt templates for each stage of a consensus query.
//!
//! Every template is deterministic: the same inputs always render the same
//! prompt, which keeps request fingerprints and cached results honest.

use crate::core::request::{ConsensusMethod, ReasoningMethod};

/// Templates for generating prompts at each stage
pub struct PromptRegistry;

impl PromptRegistry {
    /// Render the answer prompt for one model.
    ///
    /// The frame depends on the consensus method; `role` wraps the question in
    /// an expert persona and `reasoning` prepends a structured scaffold when
    /// chain-of-thought prompting is enabled.
    pub fn answer_prompt(
        question: &str,
        role: Option<&str>,
        method: ConsensusMethod,
        reasoning: Option<ReasoningMethod>,
    ) -> String {
        let mut prompt = String::new();

        if let Some(reasoning) = reasoning {
            prompt.push_str(Self::reasoning_scaffold(reasoning));
            prompt.push_str("\n\n");
        }

        match (method, role) {
            (ConsensusMethod::Debate, _) => {
                prompt.push_str(
                    "You are taking part in a structured debate. State the strongest \
                     defensible position on the question below, argue for it directly, \
                     and address the most serious counterargument.\n\n",
                );
            }
            (_, Some(role)) => {
                prompt.push_str(&format!(
                    "You are {role}. Answer the following question from that \
                     perspective, drawing on the expertise the role implies.\n\n"
                ));
            }
            (_, None) => {
                prompt.push_str(
                    "Provide a thoughtful, well-reasoned answer to the following \
                     question. Be concise but complete.\n\n",
                );
            }
        }

        prompt.push_str("Question:\n");
        prompt.push_str(question);
        prompt
    }

    /// Prompt asking a model to critique the current best answer.
    pub fn critic_prompt(question: &str, answer: &str) -> String {
        format!(
            "You are a critical reviewer. The question was:\n\n{question}\n\n\
             A candidate answer follows. Identify factual errors, gaps, and weak \
             reasoning, and give concrete suggestions for improvement.\n\n\
             Candidate answer:\n{answer}"
        )
    }

    /// Prompt asking a model to revise an answer given a critique.
    pub fn reviser_prompt(question: &str, answer: &str, critique: &str) -> String {
        format!(
            "You are a reviser. Improve the answer below using the critique, \
             keeping everything that is already correct.\n\n\
             Question:\n{question}\n\n\
             Original answer:\n{answer}\n\n\
             Critique:\n{critique}\n\n\
             Produce the improved answer only."
        )
    }

    /// Deterministic reasoning scaffold for a chain-of-thought request.
    pub fn reasoning_scaffold(method: ReasoningMethod) -> &'static str {
        match method {
            ReasoningMethod::ChainOfThought => {
                "Reason through the problem step by step before answering: analyse \
                 what is being asked, gather the relevant facts, form a hypothesis, \
                 check it against the evidence, then state your conclusion."
            }
            ReasoningMethod::SocraticMethod => {
                "Approach the problem by questioning: pose the key sub-questions the \
                 problem raises, answer each one honestly, and let the final answer \
                 emerge from those answers."
            }
            ReasoningMethod::MultiPerspective => {
                "Consider the problem from at least three distinct perspectives, \
                 note where they agree and disagree, then synthesise a balanced \
                 conclusion."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_prompt_contains_question() {
        let prompt = PromptRegistry::answer_prompt(
            "What is Rust?",
            None,
            ConsensusMethod::DirectConsensus,
            None,
        );
        assert!(prompt.contains("What is Rust?"));
    }

    #[test]
    fn role_shapes_the_prompt() {
        let prompt = PromptRegistry::answer_prompt(
            "What is Rust?",
            Some("a systems programmer"),
            ConsensusMethod::ExpertRoles,
            None,
        );
        assert!(prompt.contains("You are a systems programmer"));
    }

    #[test]
    fn debate_method_overrides_role_frame() {
        let prompt = PromptRegistry::answer_prompt(
            "Tabs or spaces?",
            Some("an editor author"),
            ConsensusMethod::Debate,
            None,
        );
        assert!(prompt.contains("structured debate"));
        assert!(!prompt.contains("You are an editor author"));
    }

    #[test]
    fn reasoning_scaffold_is_prepended() {
        let prompt = PromptRegistry::answer_prompt(
            "Why is the sky blue?",
            None,
            ConsensusMethod::DirectConsensus,
            Some(ReasoningMethod::SocraticMethod),
        );
        assert!(prompt.starts_with("Approach the problem by questioning"));
        assert!(prompt.contains("Why is the sky blue?"));
    }

    #[test]
    fn templates_are_deterministic() {
        let a = PromptRegistry::critic_prompt("Q", "A");
        let b = PromptRegistry::critic_prompt("Q", "A");
        assert_eq!(a, b);
    }

    #[test]
    fn reviser_prompt_carries_all_context() {
        let prompt = PromptRegistry::reviser_prompt("Q", "A", "C");
        assert!(prompt.contains("Q"));
        assert!(prompt.contains("A"));
        assert!(prompt.contains("C"));
    }
}
