//! Request assembly — deterministic construction of the model request from
//! the agent instruction, session history, and pending user content.

use af_domain::{Content, LlmAgentConfig, Role};
use af_models::{LlmConfig, LlmRequest};
use af_sessions::Session;
use af_tools::ToolSet;

/// Build the outgoing request.
///
/// Ordering: optional leading `system` content from the agent instruction,
/// then every logged event content (non-null, role ≠ system) in append
/// order, then the pending user content unless it duplicates the list
/// tail. The system message is injected only from the instruction, never
/// replayed from the log.
pub fn build_request(
    instruction: Option<&str>,
    session: &Session,
    pending_user: Option<&Content>,
    tools: &ToolSet,
    config: &LlmAgentConfig,
) -> LlmRequest {
    let mut contents = Vec::new();

    let instruction = instruction.filter(|i| !i.is_empty());
    if let Some(instruction) = instruction {
        contents.push(Content::system_text(instruction));
    }

    for event in session.events() {
        if let Some(content) = &event.content {
            if content.role != Role::System {
                contents.push(content.clone());
            }
        }
    }

    if let Some(user) = pending_user {
        if !is_duplicate_tail(&contents, user) {
            contents.push(user.clone());
        }
    }

    LlmRequest {
        contents,
        tools: tools.declarations(),
        config: LlmConfig {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            top_p: config.top_p,
            top_k: config.top_k,
            system_instruction: instruction.map(str::to_string),
        },
    }
}

/// Duplicate means: tail is also `user`-roled, carries the same first text
/// part, and has the same part count. Non-text-first parts are compared
/// only by count.
fn is_duplicate_tail(contents: &[Content], user: &Content) -> bool {
    let Some(tail) = contents.last() else {
        return false;
    };
    tail.role == Role::User
        && user.role == Role::User
        && tail.first_text() == user.first_text()
        && tail.parts.len() == user.parts.len()
}
