//! Deterministic prompt registry for the consensus flow.

mod template;

pub use template::PromptRegistry;
