//! Tool contract for AgentFlow agents.
//!
//! A [`Tool`] is anything the model can invoke by name with JSON arguments.
//! Tools run inside a [`ToolContext`] that exposes the invocation's session
//! state and collects the state patch and workflow actions the tool wants
//! applied. [`ToolSet`] is the ordered per-agent registry;
//! [`FunctionTool`] wraps a plain async closure into a `Tool`.

pub mod context;
pub mod function;
pub mod set;
pub mod tool;

pub use context::ToolContext;
pub use function::FunctionTool;
pub use set::ToolSet;
pub use tool::Tool;
