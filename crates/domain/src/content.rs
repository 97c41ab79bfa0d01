use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Who authored a piece of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Tool-response content synthesized by the runtime on behalf of an agent.
    Agent,
    System,
}

/// One element of a [`Content`] (provider-agnostic).
///
/// A `FunctionCall` and its paired `FunctionResponse` share the same `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Part {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "function_call")]
    FunctionCall {
        id: String,
        name: String,
        args: Map<String, Value>,
    },
    #[serde(rename = "function_response")]
    FunctionResponse {
        id: String,
        name: String,
        response: Map<String, Value>,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn function_call(
        id: impl Into<String>,
        name: impl Into<String>,
        args: Map<String, Value>,
    ) -> Self {
        Part::FunctionCall {
            id: id.into(),
            name: name.into(),
            args,
        }
    }

    pub fn function_response(
        id: impl Into<String>,
        name: impl Into<String>,
        response: Map<String, Value>,
    ) -> Self {
        Part::FunctionResponse {
            id: id.into(),
            name: name.into(),
            response,
        }
    }

    pub fn is_function_call(&self) -> bool {
        matches!(self, Part::FunctionCall { .. })
    }
}

/// A role-tagged, ordered list of [`Part`]s — the unit sent to and
/// received from a model backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

// ── Convenience constructors ───────────────────────────────────────

impl Content {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::text(text)])
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![Part::text(text)])
    }

    pub fn agent_text(text: impl Into<String>) -> Self {
        Self::new(Role::Agent, vec![Part::text(text)])
    }

    pub fn system_text(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![Part::text(text)])
    }

    /// The first text part, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.parts.iter().find_map(|p| match p {
            Part::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Join all text parts with `"\n"`. Non-text parts are skipped.
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// All function-call parts, in order.
    pub fn function_calls(&self) -> Vec<&Part> {
        self.parts.iter().filter(|p| p.is_function_call()).collect()
    }

    pub fn has_function_calls(&self) -> bool {
        self.parts.iter().any(Part::is_function_call)
    }

    /// Name of the first function-call part, if any.
    pub fn first_call_name(&self) -> Option<&str> {
        self.parts.iter().find_map(|p| match p {
            Part::FunctionCall { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }
}
