use serde_json::{Map, Value};

use af_domain::EventActions;
use af_sessions::InvocationContext;

/// Per-call execution context handed to a running tool.
///
/// Wraps the invocation (session access, cancellation) and is tagged with
/// the function-call id. Mutations a tool requests — state patches,
/// escalation, transfer — are accumulated here and folded into the
/// tool-response event by the executor.
pub struct ToolContext {
    invocation: InvocationContext,
    call_id: String,
    tool_name: String,
    state_delta: Map<String, Value>,
    actions: EventActions,
}

impl ToolContext {
    pub fn new(
        invocation: InvocationContext,
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
    ) -> Self {
        Self {
            invocation,
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            state_delta: Map::new(),
            actions: EventActions::default(),
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn invocation_id(&self) -> &str {
        &self.invocation.invocation_id
    }

    pub fn agent_name(&self) -> &str {
        &self.invocation.agent_name
    }

    pub fn is_cancelled(&self) -> bool {
        self.invocation.is_cancelled()
    }

    /// Read a value from session state.
    pub fn state_value(&self, key: &str) -> Option<Value> {
        self.invocation.session.state_value(key)
    }

    /// Request a session-state patch. Applied by the executor as soon as
    /// the tool returns.
    pub fn set_state(&mut self, key: impl Into<String>, value: Value) {
        self.state_delta.insert(key.into(), value);
    }

    /// Ask the parent workflow to stop iterating.
    pub fn escalate(&mut self) {
        self.actions.escalate = true;
    }

    /// Ask to hand the conversation to a named sibling agent.
    pub fn transfer_to(&mut self, agent: impl Into<String>) {
        self.actions.transfer_to = Some(agent.into());
    }

    pub fn state_delta(&self) -> &Map<String, Value> {
        &self.state_delta
    }

    /// Actions with the accumulated state delta folded in, for embedding
    /// into the tool-response event.
    pub fn into_actions(mut self) -> EventActions {
        self.actions.state_delta = self.state_delta;
        self.actions
    }
}
