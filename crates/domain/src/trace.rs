use serde::Serialize;

/// Structured trace events emitted across all AgentFlow crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    InvocationStarted {
        invocation_id: String,
        agent: String,
        streaming: bool,
    },
    ModelCall {
        invocation_id: String,
        model: String,
        duration_ms: u64,
    },
    ToolDispatched {
        invocation_id: String,
        call_id: String,
        tool_name: String,
        duration_ms: u64,
        is_error: bool,
    },
    DetectorTripped {
        invocation_id: String,
        detector: String,
        detail: String,
    },
    SessionAppend {
        session_id: String,
        event_id: String,
        state_keys: usize,
    },
    RemoteDispatch {
        agent: String,
        mode: String,
        task_id: Option<String>,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "af_event");
    }
}
