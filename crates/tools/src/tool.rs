use serde_json::{Map, Value};

use af_domain::{Result, ToolDeclaration};
use af_models::LlmRequest;

use crate::context::ToolContext;

/// A capability the model can invoke by name.
///
/// The returned value is shaped by the executor: a JSON object is used as
/// the function-response body verbatim; anything else is wrapped as
/// `{"result": value}`. Errors become `{"error": message}` and are not
/// fatal to the invocation.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Long-running tools get an intermediate `partial` event published
    /// while the invocation continues.
    fn is_long_running(&self) -> bool {
        false
    }

    /// Declaration sent to the model. `None` keeps the tool callable but
    /// undeclared (it is dropped from the request's tool list).
    fn declaration(&self) -> Option<ToolDeclaration>;

    /// Execute with the arguments the model supplied.
    async fn run(&self, args: Map<String, Value>, ctx: &mut ToolContext) -> Result<Value>;

    /// Optional hook to mutate the outgoing model request (e.g. to inject
    /// a built-in capability). Default is a no-op.
    fn process_request(&self, _ctx: &mut ToolContext, _req: &mut LlmRequest) -> Result<()> {
        Ok(())
    }
}
