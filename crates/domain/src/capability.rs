use serde::{Deserialize, Serialize};

/// Capability profile for a model family.
///
/// The runtime uses profiles to downgrade requests for weak models:
/// stripping tool declarations, truncating tool lists, and routing
/// through the simplified single-call flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelProfile {
    pub supports_tool_calling: bool,
    pub supports_complex_json: bool,
    pub requires_simple_prompts: bool,
    /// Upper bound on declared tools sent per request.
    pub max_tool_calls_per_turn: usize,
    pub prompt_style: PromptStyle,
}

/// How the model family prefers its prompts shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStyle {
    /// Full system instruction + schema-validated tool declarations.
    Structured,
    /// Tool declarations supported, looser JSON adherence.
    Conversational,
    /// Plain prose only; tools described inline in the instruction.
    Simple,
}

impl ModelProfile {
    /// Classify a model name by its prefix. Unknown names get the most
    /// conservative profile.
    pub fn classify(model: &str) -> Self {
        let normalized = model.trim().to_ascii_lowercase();
        if normalized.starts_with("gemini") {
            Self {
                supports_tool_calling: true,
                supports_complex_json: true,
                requires_simple_prompts: false,
                max_tool_calls_per_turn: 10,
                prompt_style: PromptStyle::Structured,
            }
        } else if normalized.starts_with("gpt-4") {
            Self {
                supports_tool_calling: true,
                supports_complex_json: true,
                requires_simple_prompts: false,
                max_tool_calls_per_turn: 8,
                prompt_style: PromptStyle::Structured,
            }
        } else if normalized.starts_with("gpt-3.5") {
            Self {
                supports_tool_calling: true,
                supports_complex_json: false,
                requires_simple_prompts: false,
                max_tool_calls_per_turn: 4,
                prompt_style: PromptStyle::Conversational,
            }
        } else if normalized.starts_with("llama") {
            Self {
                supports_tool_calling: false,
                supports_complex_json: false,
                requires_simple_prompts: true,
                max_tool_calls_per_turn: 0,
                prompt_style: PromptStyle::Simple,
            }
        } else {
            Self::conservative()
        }
    }

    /// The profile assumed for unrecognized models.
    pub fn conservative() -> Self {
        Self {
            supports_tool_calling: false,
            supports_complex_json: false,
            requires_simple_prompts: true,
            max_tool_calls_per_turn: 0,
            prompt_style: PromptStyle::Simple,
        }
    }
}
