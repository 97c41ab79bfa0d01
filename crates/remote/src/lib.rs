//! Remote agent client for AgentFlow.
//!
//! Binds a local [`RemoteAgent`] to an external agent described by an
//! agent card: the card is resolved lazily (inline, URL, or file), a user
//! message is dispatched via one of three strategies (single-shot,
//! polling, streaming), and server responses are translated into local
//! events on the invocation's stream.

pub mod card;
pub mod client;
pub mod transport;

pub use card::{AgentCard, CardCapabilities, CardError, CardResolver, CardSource};
pub use client::{DispatchMode, RemoteAgent, RemoteAgentBuilder};
pub use transport::{
    RemoteMessage, RemotePart, RemoteTransport, Task, TaskEvent, TaskState, TransportError,
};
