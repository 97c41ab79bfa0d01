use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use af_domain::{Content, RunConfig};

use crate::session::Session;

/// Per-run handle threaded through an agent and its sub-agents.
///
/// Cloning is cheap; [`child`](Self::child) derives a sub-invocation that
/// shares the session and invocation id, inherits cancellation through a
/// child token, and extends the branch label as `parent.child`.
#[derive(Clone)]
pub struct InvocationContext {
    pub invocation_id: String,
    /// Name of the agent currently driving this invocation.
    pub agent_name: String,
    pub session: Arc<Session>,
    /// Initial user message; the driver clears it once recorded.
    pub user_content: Option<Content>,
    pub branch: Option<String>,
    /// Metadata stamped onto every event this invocation publishes
    /// (workflow composers use it to tag child events with `a2a:*` keys
    /// before they reach the session log).
    pub metadata: HashMap<String, Value>,
    pub run_config: RunConfig,
    pub cancel: CancellationToken,
}

impl InvocationContext {
    pub fn new(
        agent_name: impl Into<String>,
        session: Arc<Session>,
        user_content: Option<Content>,
    ) -> Self {
        Self {
            invocation_id: uuid::Uuid::new_v4().to_string(),
            agent_name: agent_name.into(),
            session,
            user_content,
            branch: None,
            metadata: HashMap::new(),
            run_config: RunConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_run_config(mut self, run_config: RunConfig) -> Self {
        self.run_config = run_config;
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Derive a sub-invocation for `agent_name`. The child starts with no
    /// pending user content; cancelling the parent cancels the child.
    pub fn child(&self, agent_name: impl Into<String>) -> Self {
        let agent_name = agent_name.into();
        let branch = match &self.branch {
            Some(parent) => format!("{parent}.{agent_name}"),
            None => agent_name.clone(),
        };
        Self {
            invocation_id: self.invocation_id.clone(),
            agent_name,
            session: self.session.clone(),
            user_content: None,
            branch: Some(branch),
            metadata: self.metadata.clone(),
            run_config: self.run_config,
            cancel: self.cancel.child_token(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
