use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::content::Content;

/// Side effects an event requests against the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventActions {
    /// Key→value patch applied to session state when the event is appended.
    #[serde(default)]
    pub state_delta: Map<String, Value>,
    /// Artifact name→version patch (applied by an external artifact service).
    #[serde(default)]
    pub artifact_delta: Map<String, Value>,
    /// The agent asks its parent workflow to stop iterating.
    #[serde(default)]
    pub escalate: bool,
    /// The agent asks to hand the conversation to a named sibling.
    #[serde(default)]
    pub transfer_to: Option<String>,
}

impl EventActions {
    pub fn is_empty(&self) -> bool {
        self.state_delta.is_empty()
            && self.artifact_delta.is_empty()
            && !self.escalate
            && self.transfer_to.is_none()
    }
}

/// The unit appended to a session log. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub invocation_id: String,
    /// Agent name, or `"user"` for synthesized user events.
    pub author: String,
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub error: Option<String>,
    /// Terminal for the current invocation.
    #[serde(default)]
    pub turn_complete: bool,
    /// A streaming chunk (not yet a complete response).
    #[serde(default)]
    pub partial: bool,
    /// Dotted path tagging events of nested / workflow-composed agents.
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub long_running_tool_ids: Vec<String>,
    #[serde(default)]
    pub actions: EventActions,
    /// Free-form metadata bag (workflow composition uses `a2a:*` keys).
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(invocation_id: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            invocation_id: invocation_id.into(),
            author: author.into(),
            content: None,
            error: None,
            turn_complete: false,
            partial: false,
            branch: None,
            long_running_tool_ids: Vec::new(),
            actions: EventActions::default(),
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_content(mut self, content: Content) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    pub fn completed(mut self) -> Self {
        self.turn_complete = true;
        self
    }

    pub fn as_partial(mut self) -> Self {
        self.partial = true;
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_actions(mut self, actions: EventActions) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Whether this event terminates its invocation (success or error).
    pub fn is_terminal(&self) -> bool {
        self.turn_complete || self.error.is_some()
    }

    /// Role of the content, if present.
    pub fn role(&self) -> Option<crate::content::Role> {
        self.content.as_ref().map(|c| c.role)
    }
}
