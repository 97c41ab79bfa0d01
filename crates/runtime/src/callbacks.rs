//! Lifecycle callback slots for an [`LlmAgent`](crate::LlmAgent).
//!
//! Callbacks observe and may mutate the data flowing through the turn
//! loop. Any callback failure is fatal to the invocation (it surfaces as
//! a terminal error event).

use std::sync::Arc;

use serde_json::{Map, Value};

use af_domain::{Event, Result};
use af_models::{LlmRequest, LlmResponse};
use af_sessions::InvocationContext;
use af_tools::ToolContext;

/// Runs before each model call; may rewrite the outgoing request.
pub type BeforeModelCallback =
    Arc<dyn Fn(&InvocationContext, &mut LlmRequest) -> Result<()> + Send + Sync>;

/// Runs after each model call; may rewrite the response.
pub type AfterModelCallback =
    Arc<dyn Fn(&InvocationContext, &mut LlmResponse) -> Result<()> + Send + Sync>;

/// Runs before each tool call; may rewrite the arguments.
pub type BeforeToolCallback =
    Arc<dyn Fn(&ToolContext, &mut Map<String, Value>) -> Result<()> + Send + Sync>;

/// Runs after a tool batch, once per synthesized response event.
pub type AfterToolCallback =
    Arc<dyn Fn(&InvocationContext, &Event) -> Result<()> + Send + Sync>;

/// The four optional lifecycle slots.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub before_model: Option<BeforeModelCallback>,
    pub after_model: Option<AfterModelCallback>,
    pub before_tool: Option<BeforeToolCallback>,
    pub after_tool: Option<AfterToolCallback>,
}

impl Callbacks {
    pub fn is_empty(&self) -> bool {
        self.before_model.is_none()
            && self.after_model.is_none()
            && self.before_tool.is_none()
            && self.after_tool.is_none()
    }
}
