//! Shared test doubles: a scripted model backend and canned child agents.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

use af_domain::stream::BoxStream;
use af_domain::{Content, Error, Event, Part, Result, Role};
use af_models::{LlmBackend, LlmRequest, LlmResponse};
use af_runtime::{Agent, EventSink, EVENT_CHANNEL_CAPACITY};
use af_sessions::InvocationContext;
use af_tools::FunctionTool;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scripted backend
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Replays a queue of canned responses; an optional default repeats
/// forever once the queue drains. Captures every request for assertions.
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Result<LlmResponse>>>,
    default: Option<LlmResponse>,
    stream_scripts: Mutex<VecDeque<Vec<Result<LlmResponse>>>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedBackend {
    pub fn scripted(responses: Vec<Result<LlmResponse>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            default: None,
            stream_scripts: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn scripted_with_default(
        responses: Vec<Result<LlmResponse>>,
        default: LlmResponse,
    ) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            default: Some(default),
            stream_scripts: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Each inner vec is the chunk sequence for one `generate_stream` call.
    pub fn streaming(scripts: Vec<Vec<Result<LlmResponse>>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::new()),
            default: None,
            stream_scripts: Mutex::new(scripts.into()),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait::async_trait]
impl LlmBackend for ScriptedBackend {
    async fn generate(&self, req: LlmRequest) -> Result<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(req);

        if let Some(next) = self.responses.lock().pop_front() {
            return next;
        }
        match &self.default {
            Some(default) => Ok(default.clone()),
            None => Err(Error::Model("script exhausted".into())),
        }
    }

    async fn generate_stream(
        &self,
        req: LlmRequest,
    ) -> Result<BoxStream<'static, Result<LlmResponse>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(req);

        let chunks = self
            .stream_scripts
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Model("stream script exhausted".into()))?;
        Ok(Box::pin(futures_util::stream::iter(chunks)))
    }

    async fn close(&self) {}
}

// ── Response builders ──────────────────────────────────────────────

pub fn text_response(text: &str) -> LlmResponse {
    LlmResponse::from_content(Content::assistant_text(text))
}

pub fn partial_text(text: &str) -> LlmResponse {
    LlmResponse {
        content: Some(Content::assistant_text(text)),
        partial: true,
        metadata: Default::default(),
    }
}

pub fn call_response(id: &str, name: &str, args: Value) -> LlmResponse {
    let args = match args {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    LlmResponse::from_content(Content::new(
        Role::Assistant,
        vec![Part::function_call(id, name, args)],
    ))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A tool that counts invocations and returns a fixed object.
pub fn counting_tool(name: &str, counter: Arc<AtomicUsize>, result: Value) -> FunctionTool {
    FunctionTool::new(
        name,
        format!("{name} test tool"),
        json!({"type": "object", "properties": {}, "additionalProperties": true}),
        move |_args, _ctx| {
            let counter = counter.clone();
            let result = result.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(result)
            })
        },
    )
}

/// An echo tool returning `{"echoed": <x>}` and counting invocations.
pub fn echo_tool(counter: Arc<AtomicUsize>) -> FunctionTool {
    FunctionTool::new(
        "echo",
        "Echo the input back.",
        json!({
            "type": "object",
            "properties": { "x": { "type": "string" } },
            "required": ["x"]
        }),
        move |args, _ctx| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!({ "echoed": args.get("x").cloned().unwrap_or(Value::Null) }))
            })
        },
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Canned child agents
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Emits one `agent`-roled text event per invocation (non-terminal unless
/// `escalate` is set) and captures the input content it was handed.
pub struct TextAgent {
    name: String,
    text: String,
    escalate: bool,
    pub inputs: Mutex<Vec<Option<Content>>>,
}

impl TextAgent {
    pub fn new(name: &str, text: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            text: text.into(),
            escalate: false,
            inputs: Mutex::new(Vec::new()),
        })
    }

    pub fn escalating(name: &str, text: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            text: text.into(),
            escalate: true,
            inputs: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait::async_trait]
impl Agent for TextAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "canned test agent"
    }

    fn run(self: Arc<Self>, ctx: InvocationContext) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            self.inputs.lock().push(ctx.user_content.clone());
            let sink = EventSink::for_invocation(tx, &ctx);
            let mut event = Event::new(&ctx.invocation_id, &self.name)
                .with_content(Content::agent_text(&self.text));
            event.actions.escalate = self.escalate;
            let _ = sink.publish(event).await;
        });
        rx
    }
}

/// Emits a single error event per invocation.
pub struct FailingAgent {
    name: String,
}

impl FailingAgent {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self { name: name.into() })
    }
}

#[async_trait::async_trait]
impl Agent for FailingAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "always-failing test agent"
    }

    fn run(self: Arc<Self>, ctx: InvocationContext) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let sink = EventSink::for_invocation(tx, &ctx);
            let event =
                Event::new(&ctx.invocation_id, &self.name).with_error("canned failure");
            let _ = sink.publish(event).await;
        });
        rx
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Best-effort tracing init so failing tests show the runtime's spans.
/// Safe to call from every test; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Drain an event stream to completion.
pub async fn collect_events(mut rx: mpsc::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

pub fn function_response_body<'a>(event: &'a Event, index: usize) -> &'a Map<String, Value> {
    match &event.content.as_ref().expect("event content").parts[index] {
        Part::FunctionResponse { response, .. } => response,
        other => panic!("expected function response part, got {other:?}"),
    }
}
