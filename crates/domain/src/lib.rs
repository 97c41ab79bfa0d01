//! Shared domain types for the AgentFlow runtime.
//!
//! Everything here is backend-agnostic: the content/part model exchanged
//! with language models, the immutable [`event::Event`] appended to session
//! logs, tool declarations, run configuration, and the common error type.

pub mod capability;
pub mod config;
pub mod content;
pub mod error;
pub mod event;
pub mod stream;
pub mod tool;
pub mod trace;

pub use config::{LlmAgentConfig, RemoteConfig, RunConfig, SequentialConfig};
pub use content::{Content, Part, Role};
pub use error::{Error, Result};
pub use event::{Event, EventActions};
pub use tool::ToolDeclaration;
