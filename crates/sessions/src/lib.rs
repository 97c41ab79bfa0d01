//! Session management for AgentFlow.
//!
//! A [`Session`] is an append-only event log plus a mutable key→value state
//! map, owned by a [`SessionService`]. The runtime only ever appends; it
//! never creates or destroys sessions itself. [`InvocationContext`] is the
//! per-run handle threaded through agents, carrying the session reference,
//! cancellation, branch label, and run configuration.

pub mod invocation;
pub mod service;
pub mod session;

pub use invocation::InvocationContext;
pub use service::{InMemorySessionService, SessionService};
pub use session::Session;
