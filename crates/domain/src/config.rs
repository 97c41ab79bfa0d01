use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-invocation knobs supplied by the caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RunConfig {
    /// Maximum number of model turns per invocation.
    #[serde(default = "d_max_turns")]
    pub max_turns: usize,
    /// Request streaming responses from the backend.
    #[serde(default)]
    pub streaming: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            streaming: false,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM agent configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Model and safety limits for an LLM-backed agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmAgentConfig {
    /// Model identifier passed through to the backend (e.g. `"gemini-2.0-flash"`).
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub top_k: Option<u32>,
    /// Hard cap on function calls the model may emit in a single turn.
    #[serde(default = "d_max_tool_calls")]
    pub max_tool_calls: usize,
    /// Per-call tool execution timeout.
    #[serde(default = "d_tool_timeout_ms")]
    pub tool_call_timeout_ms: u64,
    /// Model call attempts before surfacing a transient error.
    #[serde(default = "d_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default)]
    pub streaming_enabled: bool,
}

impl Default for LlmAgentConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: None,
            max_tokens: None,
            top_p: None,
            top_k: None,
            max_tool_calls: 5,
            tool_call_timeout_ms: 30_000,
            retry_attempts: 3,
            streaming_enabled: false,
        }
    }
}

impl LlmAgentConfig {
    pub fn tool_call_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_call_timeout_ms)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sequential workflow configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Round-robin behaviour of a sequential workflow agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SequentialConfig {
    #[serde(default = "d_max_rounds")]
    pub max_rounds: usize,
    /// Abort the workflow when a child ends with an error event.
    #[serde(default = "d_true")]
    pub stop_on_error: bool,
    /// Children read the full session history instead of a single message.
    #[serde(default = "d_true")]
    pub pass_complete_history: bool,
    /// Synthesize a "continue" marker when a child has no input content.
    #[serde(default = "d_true")]
    pub add_turn_markers: bool,
}

impl Default for SequentialConfig {
    fn default() -> Self {
        Self {
            max_rounds: 10,
            stop_on_error: true,
            pass_complete_history: true,
            add_turn_markers: true,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Remote agent configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Dispatch limits for a remote agent client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "d_poll_interval_ms")]
    pub task_polling_interval_ms: u64,
    #[serde(default = "d_poll_timeout_ms")]
    pub task_polling_timeout_ms: u64,
    #[serde(default = "d_poll_tries")]
    pub max_task_polling_tries: u32,
    /// Transport-level retries for retryable RPC errors.
    #[serde(default = "d_remote_retries")]
    pub max_retries: u32,
    #[serde(default = "d_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "d_streaming_timeout_ms")]
    pub streaming_timeout_ms: u64,
    /// Use the streaming RPC even when the card does not advertise it.
    #[serde(default)]
    pub force_streaming: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            task_polling_interval_ms: 1_000,
            task_polling_timeout_ms: 60_000,
            max_task_polling_tries: 30,
            max_retries: 3,
            retry_backoff_ms: 500,
            streaming_timeout_ms: 120_000,
            force_streaming: false,
        }
    }
}

impl RemoteConfig {
    pub fn task_polling_interval(&self) -> Duration {
        Duration::from_millis(self.task_polling_interval_ms)
    }

    pub fn task_polling_timeout(&self) -> Duration {
        Duration::from_millis(self.task_polling_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn streaming_timeout(&self) -> Duration {
        Duration::from_millis(self.streaming_timeout_ms)
    }
}

// ── serde default helpers ──────────────────────────────────────────

fn d_max_turns() -> usize {
    10
}
fn d_max_tool_calls() -> usize {
    5
}
fn d_tool_timeout_ms() -> u64 {
    30_000
}
fn d_retry_attempts() -> u32 {
    3
}
fn d_max_rounds() -> usize {
    10
}
fn d_true() -> bool {
    true
}
fn d_poll_interval_ms() -> u64 {
    1_000
}
fn d_poll_timeout_ms() -> u64 {
    60_000
}
fn d_poll_tries() -> u32 {
    30
}
fn d_remote_retries() -> u32 {
    3
}
fn d_retry_backoff_ms() -> u64 {
    500
}
fn d_streaming_timeout_ms() -> u64 {
    120_000
}
