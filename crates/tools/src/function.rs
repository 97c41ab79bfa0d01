use futures_util::future::BoxFuture;
use serde_json::{Map, Value};

use af_domain::{Result, ToolDeclaration};

use crate::context::ToolContext;
use crate::tool::Tool;

type Handler = dyn Fn(Map<String, Value>, &mut ToolContext) -> BoxFuture<'static, Result<Value>>
    + Send
    + Sync;

/// Wraps an async closure into a [`Tool`].
///
/// The closure runs synchronously with mutable access to the
/// [`ToolContext`] (state writes, escalation) and returns the future that
/// produces the response value.
///
/// ```rust,no_run
/// use af_tools::FunctionTool;
/// use serde_json::json;
///
/// let echo = FunctionTool::new(
///     "echo",
///     "Echo the input back.",
///     json!({
///         "type": "object",
///         "properties": { "x": { "type": "string" } },
///         "required": ["x"]
///     }),
///     |args, _ctx| Box::pin(async move { Ok(json!({ "echoed": args["x"] })) }),
/// );
/// ```
pub struct FunctionTool {
    name: String,
    description: String,
    declaration: Option<ToolDeclaration>,
    long_running: bool,
    handler: Box<Handler>,
}

impl FunctionTool {
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Map<String, Value>, &mut ToolContext) -> BoxFuture<'static, Result<Value>>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        let description = description.into();
        let declaration = Some(ToolDeclaration::new(
            name.clone(),
            description.clone(),
            parameters,
        ));
        Self {
            name,
            description,
            declaration,
            long_running: false,
            handler: Box::new(handler),
        }
    }

    /// A tool that stays callable but is never advertised to the model.
    pub fn undeclared<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F,
    ) -> Self
    where
        F: Fn(Map<String, Value>, &mut ToolContext) -> BoxFuture<'static, Result<Value>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            declaration: None,
            long_running: false,
            handler: Box::new(handler),
        }
    }

    pub fn long_running(mut self, long_running: bool) -> Self {
        self.long_running = long_running;
        self
    }
}

#[async_trait::async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn is_long_running(&self) -> bool {
        self.long_running
    }

    fn declaration(&self) -> Option<ToolDeclaration> {
        self.declaration.clone()
    }

    async fn run(&self, args: Map<String, Value>, ctx: &mut ToolContext) -> Result<Value> {
        (self.handler)(args, ctx).await
    }
}
