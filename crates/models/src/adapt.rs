//! Request adaptation for models with reduced capabilities.
//!
//! Weak models either cannot call tools at all or handle only a few
//! declarations per turn. [`adapt_request`] downgrades an outgoing request
//! to match the model's [`ModelProfile`]: declarations are stripped (and
//! described inline in the system instruction) or truncated.

use af_domain::capability::ModelProfile;
use af_domain::ToolDeclaration;

use crate::backend::LlmRequest;

/// Substrings suggesting the model tried to use a tool it could not call.
const TOOL_USE_INDICATORS: [&str; 6] = [
    "i need to",
    "let me search",
    "i'll search",
    "searching for",
    "let me check",
    "i should use",
];

/// Appended to a simplified-flow answer when the model narrated tool use.
pub const TOOL_FALLBACK_NOTE: &str = "\n\n(Note: tools are unavailable for this model; \
the answer above is based only on information the model already has.)";

/// Downgrade `req` in place to fit the model's capability profile.
///
/// Returns `true` when tool declarations were stripped entirely (the
/// caller should route through the simplified flow).
pub fn adapt_request(profile: &ModelProfile, req: &mut LlmRequest) -> bool {
    if req.tools.is_empty() {
        return !profile.supports_tool_calling;
    }

    if !profile.supports_tool_calling {
        let listing = inline_tool_list(&req.tools);
        req.config.system_instruction = Some(match req.config.system_instruction.take() {
            Some(existing) => format!("{existing}\n\n{listing}"),
            None => listing,
        });
        let stripped = req.tools.len();
        req.tools.clear();
        tracing::debug!(stripped, "stripped tool declarations for non-tool-calling model");
        return true;
    }

    if req.tools.len() > profile.max_tool_calls_per_turn {
        let dropped = req.tools.len() - profile.max_tool_calls_per_turn;
        req.tools.truncate(profile.max_tool_calls_per_turn);
        tracing::debug!(
            kept = profile.max_tool_calls_per_turn,
            dropped,
            "truncated tool declarations to model limit"
        );
    }
    false
}

/// Render tools as a bulleted list for inline prompting.
pub fn inline_tool_list(tools: &[ToolDeclaration]) -> String {
    let mut out = String::from("You cannot call tools directly. For reference, these capabilities exist:");
    for tool in tools {
        out.push_str("\n- ");
        out.push_str(&tool.name);
        out.push_str(": ");
        out.push_str(&tool.description);
    }
    out
}

/// Whether a simplified-flow answer reads like an attempted tool call.
pub fn mentions_tool_use(text: &str) -> bool {
    let lowered = text.to_ascii_lowercase();
    TOOL_USE_INDICATORS.iter().any(|i| lowered.contains(i))
}
