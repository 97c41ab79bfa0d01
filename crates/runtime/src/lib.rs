//! Core runtime — the conversation flow driver that ties sessions, request
//! assembly, model calls, tool dispatch, and termination control into one
//! deterministic loop.
//!
//! Entry point: build an [`LlmAgent`] (or compose agents with
//! [`SequentialAgent`]) and call [`Agent::run`] with an
//! `InvocationContext`; the result is an ordered stream of
//! [`af_domain::Event`]s ending in a terminal event.

pub mod agent;
pub mod assembly;
pub mod callbacks;
pub mod detectors;
mod executor;
pub mod flow;
pub mod sequential;

pub use agent::{Agent, EventSink, EVENT_CHANNEL_CAPACITY};
pub use callbacks::Callbacks;
pub use flow::{LlmAgent, LlmAgentBuilder};
pub use sequential::{SequentialAgent, SequentialAgentBuilder};
