//! The remote agent: card resolution, dispatch strategies, and event
//! translation.

use std::sync::{Arc, OnceLock, Weak};
use std::time::Instant;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::Instrument;

use af_domain::trace::TraceEvent;
use af_domain::{Content, Error, Event, RemoteConfig, Result};
use af_models::{Backoff, RetryPolicy};
use af_runtime::{Agent, EventSink, EVENT_CHANNEL_CAPACITY};
use af_sessions::InvocationContext;

use crate::card::{AgentCard, CardResolver, CardSource};
use crate::transport::{RemoteMessage, RemoteTransport, Task, TaskEvent};

/// How to reach the remote agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// One-shot send; the response task is already terminal.
    Single,
    /// Send, then poll `get_task` until the task is terminal.
    Poll,
    /// Use the streaming RPC.
    Stream,
    /// Stream when the card advertises it (or streaming is forced),
    /// otherwise poll.
    #[default]
    Auto,
}

impl DispatchMode {
    fn as_str(&self) -> &'static str {
        match self {
            DispatchMode::Single => "single",
            DispatchMode::Poll => "poll",
            DispatchMode::Stream => "stream",
            DispatchMode::Auto => "auto",
        }
    }
}

/// A local agent bound to a remote peer through an agent card.
pub struct RemoteAgent {
    name: String,
    description: OnceLock<String>,
    resolver: CardResolver,
    transport: Arc<dyn RemoteTransport>,
    config: RemoteConfig,
    mode: DispatchMode,
    resolved: tokio::sync::Mutex<Option<AgentCard>>,
    parent: RwLock<Option<Weak<dyn Agent>>>,
}

impl RemoteAgent {
    pub fn builder(name: impl Into<String>) -> RemoteAgentBuilder {
        RemoteAgentBuilder::new(name)
    }

    /// Resolve the card on first use; later calls return the cached copy.
    /// The local description is backfilled from the card when unset.
    async fn resolve_card(&self) -> Result<AgentCard> {
        let mut resolved = self.resolved.lock().await;
        if let Some(card) = resolved.as_ref() {
            return Ok(card.clone());
        }

        let card = self.resolver.resolve().await?;
        if !card.description.is_empty() {
            let _ = self.description.set(card.description.clone());
        }
        *resolved = Some(card.clone());
        Ok(card)
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.max_retries.max(1)).with_backoff(Backoff::Fixed {
            delay: self.config.retry_backoff(),
        })
    }

    fn new_event(&self, ctx: &InvocationContext) -> Event {
        let event = Event::new(&ctx.invocation_id, &self.name);
        match &ctx.branch {
            Some(branch) => event.with_branch(branch.clone()),
            None => event,
        }
    }

    /// The outgoing message: pending user content, falling back to the
    /// most recent text in the session.
    fn outgoing_message(&self, ctx: &InvocationContext) -> Result<RemoteMessage> {
        let text = ctx
            .user_content
            .as_ref()
            .and_then(|c| c.first_text().map(str::to_string))
            .or_else(|| {
                ctx.session
                    .events()
                    .iter()
                    .rev()
                    .filter_map(|e| e.content.as_ref())
                    .find_map(|c| c.first_text().map(str::to_string))
            });
        text.map(RemoteMessage::user_text)
            .ok_or_else(|| Error::Config("no user message to dispatch".into()))
    }

    async fn dispatch(&self, ctx: &InvocationContext, sink: &EventSink) -> Result<()> {
        let card = self.resolve_card().await?;
        let message = self.outgoing_message(ctx)?;

        let mode = match self.mode {
            DispatchMode::Auto => {
                if card.capabilities.streaming || self.config.force_streaming {
                    DispatchMode::Stream
                } else {
                    DispatchMode::Poll
                }
            }
            fixed => fixed,
        };

        TraceEvent::RemoteDispatch {
            agent: self.name.clone(),
            mode: mode.as_str().into(),
            task_id: None,
        }
        .emit();

        match mode {
            DispatchMode::Single => self.dispatch_single(ctx, sink, message).await,
            DispatchMode::Poll => self.dispatch_poll(ctx, sink, message).await,
            DispatchMode::Stream | DispatchMode::Auto => {
                self.dispatch_stream(ctx, sink, message).await
            }
        }
    }

    async fn send_with_retry(
        &self,
        ctx: &InvocationContext,
        message: RemoteMessage,
    ) -> Result<Task> {
        self.retry_policy()
            .run(&ctx.cancel, || {
                let transport = self.transport.clone();
                let message = message.clone();
                async move { transport.send_message(message).await.map_err(Error::from) }
            })
            .await
    }

    // ── Single-shot ────────────────────────────────────────────────

    async fn dispatch_single(
        &self,
        ctx: &InvocationContext,
        sink: &EventSink,
        message: RemoteMessage,
    ) -> Result<()> {
        let task = self.send_with_retry(ctx, message).await?;
        self.publish_task(ctx, sink, &task).await
    }

    // ── Polling ────────────────────────────────────────────────────

    async fn dispatch_poll(
        &self,
        ctx: &InvocationContext,
        sink: &EventSink,
        message: RemoteMessage,
    ) -> Result<()> {
        let mut task = self.send_with_retry(ctx, message).await?;
        let started = Instant::now();
        let mut tries: u32 = 0;

        while !task.state.is_terminal() {
            if tries >= self.config.max_task_polling_tries {
                return Err(Error::Timeout(format!(
                    "task {} still {} after {tries} polls",
                    task.id,
                    task.state.as_str()
                )));
            }
            if started.elapsed() >= self.config.task_polling_timeout() {
                return Err(Error::Timeout(format!(
                    "task {} polling exceeded {}ms",
                    task.id, self.config.task_polling_timeout_ms
                )));
            }

            tokio::select! {
                _ = ctx.cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(self.config.task_polling_interval()) => {}
            }

            tries += 1;
            let task_id = task.id.clone();
            task = self
                .retry_policy()
                .run(&ctx.cancel, || {
                    let transport = self.transport.clone();
                    let task_id = task_id.clone();
                    async move { transport.get_task(&task_id).await.map_err(Error::from) }
                })
                .await?;
        }

        self.publish_task(ctx, sink, &task).await
    }

    // ── Streaming ──────────────────────────────────────────────────

    async fn dispatch_stream(
        &self,
        ctx: &InvocationContext,
        sink: &EventSink,
        message: RemoteMessage,
    ) -> Result<()> {
        let (tx, mut rx) = mpsc::channel::<TaskEvent>(32);
        let transport = self.transport.clone();
        let rpc = tokio::spawn(async move { transport.send_message_stream(message, tx).await });

        let deadline = tokio::time::Instant::now() + self.config.streaming_timeout();
        loop {
            let event = tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    rpc.abort();
                    return Err(Error::Cancelled);
                }
                _ = tokio::time::sleep_until(deadline) => {
                    rpc.abort();
                    return Err(Error::Timeout(format!(
                        "streaming exceeded {}ms",
                        self.config.streaming_timeout_ms
                    )));
                }
                event = rx.recv() => event,
            };

            let Some(event) = event else { break };
            let is_final = event.is_final();

            if let Some(text) = translate_stream_event(&event) {
                let local = self.new_event(ctx).with_content(Content::agent_text(text));
                let local = if is_final { local.completed() } else { local };
                sink.publish(local).await?;
            }

            if is_final {
                rpc.abort();
                return Ok(());
            }
        }

        match rpc.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(join) => Err(Error::Other(format!("streaming rpc task failed: {join}"))),
        }
    }

    async fn publish_task(
        &self,
        ctx: &InvocationContext,
        sink: &EventSink,
        task: &Task,
    ) -> Result<()> {
        let event = self
            .new_event(ctx)
            .with_content(Content::agent_text(task_text(task)))
            .completed();
        sink.publish(event).await
    }
}

/// Text for a terminal task: status message text when present, the
/// canned status line otherwise.
fn task_text(task: &Task) -> String {
    task.status_message
        .as_ref()
        .and_then(|m| m.text())
        .unwrap_or_else(|| {
            format!(
                "Task {} completed with status: {}",
                task.id,
                task.state.as_str()
            )
        })
}

/// Text for one streaming event. Non-text artifacts translate to nothing.
fn translate_stream_event(event: &TaskEvent) -> Option<String> {
    match event {
        TaskEvent::Snapshot { task, .. } => Some(task_text(task)),
        TaskEvent::StatusUpdate {
            task_id,
            state,
            message,
            ..
        } => Some(
            message
                .as_ref()
                .and_then(|m| m.text())
                .unwrap_or_else(|| {
                    format!("Task {task_id} completed with status: {}", state.as_str())
                }),
        ),
        TaskEvent::ArtifactUpdate { artifact, .. } => {
            let text = artifact.text();
            if text.is_none() {
                tracing::debug!("skipping non-text artifact update");
            }
            text
        }
    }
}

#[async_trait::async_trait]
impl Agent for RemoteAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        self.description.get().map(String::as_str).unwrap_or("")
    }

    fn parent(&self) -> Option<Arc<dyn Agent>> {
        self.parent.read().as_ref().and_then(Weak::upgrade)
    }

    fn set_parent(&self, parent: Weak<dyn Agent>) {
        *self.parent.write() = Some(parent);
    }

    fn run(self: Arc<Self>, ctx: InvocationContext) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let span = tracing::info_span!(
            "remote_invocation",
            agent = %self.name,
            invocation_id = %ctx.invocation_id,
        );

        tokio::spawn(
            async move {
                let sink = EventSink::for_invocation(tx, &ctx);
                match self.dispatch(&ctx, &sink).await {
                    Ok(()) => {}
                    // Cancellation closes the stream without a terminal
                    // event; the consumer sees the channel close.
                    Err(Error::Cancelled) => {
                        tracing::debug!("remote invocation cancelled");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "remote dispatch failed");
                        let event = self.new_event(&ctx).with_error(e.to_string());
                        let _ = sink.publish(event).await;
                    }
                }
            }
            .instrument(span),
        );

        rx
    }

    async fn cleanup(&self) {
        self.transport.close().await;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Builder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct RemoteAgentBuilder {
    name: String,
    description: Option<String>,
    source: Option<CardSource>,
    transport: Option<Arc<dyn RemoteTransport>>,
    config: RemoteConfig,
    mode: DispatchMode,
}

impl RemoteAgentBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            source: None,
            transport: None,
            config: RemoteConfig::default(),
            mode: DispatchMode::Auto,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn card(mut self, source: CardSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn RemoteTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn config(mut self, config: RemoteConfig) -> Self {
        self.config = config;
        self
    }

    pub fn mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn build(self) -> Result<Arc<RemoteAgent>> {
        if self.name.is_empty() {
            return Err(Error::Config("remote agent name must not be empty".into()));
        }
        let source = self
            .source
            .ok_or_else(|| Error::Config("missing agent card source".into()))?;
        let transport = self
            .transport
            .ok_or_else(|| Error::Config("missing remote transport".into()))?;

        let description = OnceLock::new();
        if let Some(text) = self.description.filter(|d| !d.is_empty()) {
            let _ = description.set(text);
        }

        Ok(Arc::new(RemoteAgent {
            name: self.name,
            description,
            resolver: CardResolver::new(source),
            transport,
            config: self.config,
            mode: self.mode,
            resolved: tokio::sync::Mutex::new(None),
            parent: RwLock::new(None),
        }))
    }
}
