//! Model backend contract for AgentFlow.
//!
//! Defines the provider-agnostic [`LlmBackend`] trait plus the request and
//! response types the conversation flow driver exchanges with it, the retry
//! policy for transient backend failures, and request adaptation for models
//! with reduced capabilities.

pub mod adapt;
pub mod backend;
pub mod retry;

pub use backend::{LlmBackend, LlmConfig, LlmRequest, LlmResponse};
pub use retry::{is_retryable, Backoff, RetryPolicy};
