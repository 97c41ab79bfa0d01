//! The LLM-backed agent and its conversation flow driver.
//!
//! [`LlmAgent::run`] spawns a driver task that alternates model calls and
//! tool batches until a terminal condition holds: a plain text response, a
//! tripped detector, the turn cap, cancellation, or an unrecoverable
//! error. Events are published to a bounded channel whose back-pressure is
//! the consumer's read rate.

use std::sync::{Arc, Weak};
use std::time::Instant;

use futures_util::StreamExt;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::Instrument;

use af_domain::capability::ModelProfile;
use af_domain::trace::TraceEvent;
use af_domain::{Content, Error, Event, LlmAgentConfig, Part, Result, Role};
use af_models::adapt;
use af_models::{Backoff, LlmBackend, RetryPolicy};
use af_sessions::InvocationContext;
use af_tools::{Tool, ToolContext, ToolSet};

use crate::agent::{Agent, EventSink, EVENT_CHANNEL_CAPACITY};
use crate::callbacks::Callbacks;
use crate::detectors::{self, CallBudget, RepeatDetector};
use crate::{assembly, executor};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LlmAgent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An agent that answers by driving a model backend through the turn loop.
pub struct LlmAgent {
    name: String,
    description: String,
    instruction: Option<String>,
    config: LlmAgentConfig,
    tools: ToolSet,
    backend: Arc<dyn LlmBackend>,
    callbacks: Callbacks,
    /// Downgrade requests to the model's capability profile.
    adapt_to_model: bool,
    /// Demote to the simplified flow when retries are exhausted.
    fallback_to_simple: bool,
    retry_backoff: Backoff,
    sub_agents: Vec<Arc<dyn Agent>>,
    parent: RwLock<Option<Weak<dyn Agent>>>,
}

impl std::fmt::Debug for LlmAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmAgent")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("instruction", &self.instruction)
            .field("config", &self.config)
            .field("adapt_to_model", &self.adapt_to_model)
            .field("fallback_to_simple", &self.fallback_to_simple)
            .field("retry_backoff", &self.retry_backoff)
            .field("sub_agents_count", &self.sub_agents.len())
            .finish()
    }
}

impl LlmAgent {
    pub fn builder(name: impl Into<String>) -> LlmAgentBuilder {
        LlmAgentBuilder::new(name)
    }

    pub fn instruction(&self) -> Option<&str> {
        self.instruction.as_deref()
    }

    pub fn config(&self) -> &LlmAgentConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    fn new_event(&self, ctx: &InvocationContext) -> Event {
        let event = Event::new(&ctx.invocation_id, &self.name);
        match &ctx.branch {
            Some(branch) => event.with_branch(branch.clone()),
            None => event,
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.retry_attempts).with_backoff(self.retry_backoff)
    }

    // ── Flow selection ─────────────────────────────────────────────

    async fn drive(&self, ctx: &InvocationContext, sink: &EventSink) -> Result<()> {
        let profile = self
            .adapt_to_model
            .then(|| ModelProfile::classify(&self.config.model));

        if let Some(profile) = &profile {
            if !profile.supports_tool_calling {
                return self.run_simplified(ctx, sink).await;
            }
        }

        let streaming = self.config.streaming_enabled || ctx.run_config.streaming;
        let result = if streaming {
            let mut pending_user = ctx.user_content.clone();
            self.stream_round(ctx, sink, &mut pending_user).await
        } else {
            self.run_turns(ctx, sink, profile.as_ref()).await
        };

        match result {
            Err(e) if self.fallback_to_simple && af_models::is_retryable(&e) => {
                tracing::warn!(error = %e, "retries exhausted, demoting to simplified flow");
                self.run_simplified(ctx, sink).await
            }
            other => other,
        }
    }

    // ── Turn loop ──────────────────────────────────────────────────

    async fn run_turns(
        &self,
        ctx: &InvocationContext,
        sink: &EventSink,
        profile: Option<&ModelProfile>,
    ) -> Result<()> {
        let mut pending_user = ctx.user_content.clone();
        let mut budget = CallBudget::new(self.config.max_tool_calls);
        let repeat = RepeatDetector::default();

        for turn in 0..ctx.run_config.max_turns {
            if ctx.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let mut response = self
                .call_model(ctx, pending_user.as_ref(), profile)
                .await?;

            if let Some(cb) = &self.callbacks.after_model {
                cb(ctx, &mut response).map_err(|e| Error::Callback(format!("after_model: {e}")))?;
            }

            // Record the initial user message ahead of the first model
            // event, then stop re-sending it on later turns.
            if turn == 0 {
                if let Some(user) = pending_user.take() {
                    self.record_user_content(ctx, user);
                }
            }

            let Some(content) = response.content else {
                sink.publish(self.new_event(ctx).completed()).await?;
                return Ok(());
            };

            let calls: Vec<Part> = content.function_calls().into_iter().cloned().collect();

            if calls.is_empty() {
                sink.publish(self.new_event(ctx).with_content(content).completed())
                    .await?;
                return Ok(());
            }

            // Loop-condition checks run before anything is dispatched.
            if detectors::exceeds_turn_cap(calls.len(), self.config.max_tool_calls) {
                return Err(Error::ToolLimit);
            }
            if budget.observe(calls.len()) {
                TraceEvent::DetectorTripped {
                    invocation_id: ctx.invocation_id.clone(),
                    detector: "call_budget".into(),
                    detail: format!("{} calls observed", budget.observed()),
                }
                .emit();
                sink.publish(
                    self.new_event(ctx)
                        .with_content(Content::assistant_text(detectors::MAX_CALLS_MESSAGE))
                        .completed(),
                )
                .await?;
                return Ok(());
            }

            sink.publish(self.new_event(ctx).with_content(content)).await?;

            let response_event = executor::execute_batch(
                &self.name,
                &self.config,
                &self.tools,
                &self.callbacks,
                ctx,
                &calls,
                sink,
            )
            .await?;
            sink.publish(response_event).await?;

            if repeat.tripped(turn + 1, &ctx.session) {
                TraceEvent::DetectorTripped {
                    invocation_id: ctx.invocation_id.clone(),
                    detector: "repeat".into(),
                    detail: "consecutive identical tool calls".into(),
                }
                .emit();
                sink.publish(
                    self.new_event(ctx)
                        .with_content(Content::assistant_text(detectors::REPEAT_MESSAGE))
                        .completed(),
                )
                .await?;
                return Ok(());
            }
        }

        tracing::debug!(
            max_turns = ctx.run_config.max_turns,
            "turn budget exhausted without a terminal response"
        );
        Ok(())
    }

    /// Assemble the request, run the request hooks and `before_model`
    /// callback, and call the backend under the retry policy.
    async fn call_model(
        &self,
        ctx: &InvocationContext,
        pending_user: Option<&Content>,
        profile: Option<&ModelProfile>,
    ) -> Result<af_models::LlmResponse> {
        let mut request = assembly::build_request(
            self.instruction.as_deref(),
            &ctx.session,
            pending_user,
            &self.tools,
            &self.config,
        );

        if let Some(profile) = profile {
            adapt::adapt_request(profile, &mut request);
        }

        for tool in self.tools.iter() {
            let mut tool_ctx = ToolContext::new(ctx.clone(), "", tool.name().to_string());
            tool.process_request(&mut tool_ctx, &mut request)?;
        }

        if let Some(cb) = &self.callbacks.before_model {
            cb(ctx, &mut request).map_err(|e| Error::Callback(format!("before_model: {e}")))?;
        }

        let started = Instant::now();
        let response = self
            .retry_policy()
            .run(&ctx.cancel, || {
                let backend = self.backend.clone();
                let request = request.clone();
                async move { backend.generate(request).await }
            })
            .await?;

        TraceEvent::ModelCall {
            invocation_id: ctx.invocation_id.clone(),
            model: self.config.model.clone(),
            duration_ms: started.elapsed().as_millis() as u64,
        }
        .emit();

        Ok(response)
    }

    /// Append a synthesized `user` event unless the session tail already
    /// records the same content.
    fn record_user_content(&self, ctx: &InvocationContext, user: Content) {
        let tail_matches = ctx
            .session
            .last_event()
            .and_then(|e| e.content)
            .map(|c| {
                c.role == Role::User
                    && c.first_text() == user.first_text()
                    && c.parts.len() == user.parts.len()
            })
            .unwrap_or(false);

        if !tail_matches {
            let mut event = Event::new(&ctx.invocation_id, "user").with_content(user);
            if let Some(branch) = &ctx.branch {
                event.branch = Some(branch.clone());
            }
            ctx.session.append(event);
        }
    }

    // ── Streaming variant ──────────────────────────────────────────

    /// One streaming round: open the stream, publish chunks, and on a
    /// final chunk with function calls run the tool pipeline and recurse.
    async fn stream_round(
        &self,
        ctx: &InvocationContext,
        sink: &EventSink,
        pending_user: &mut Option<Content>,
    ) -> Result<()> {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut request = assembly::build_request(
            self.instruction.as_deref(),
            &ctx.session,
            pending_user.as_ref(),
            &self.tools,
            &self.config,
        );

        if let Some(cb) = &self.callbacks.before_model {
            cb(ctx, &mut request).map_err(|e| Error::Callback(format!("before_model: {e}")))?;
        }

        let mut stream = self
            .retry_policy()
            .run(&ctx.cancel, || {
                let backend = self.backend.clone();
                let request = request.clone();
                async move { backend.generate_stream(request).await }
            })
            .await?;

        if let Some(user) = pending_user.take() {
            self.record_user_content(ctx, user);
        }

        let mut accumulated: Vec<Part> = Vec::new();

        loop {
            let item = tokio::select! {
                _ = ctx.cancel.cancelled() => return Err(Error::Cancelled),
                item = stream.next() => item,
            };
            let Some(chunk) = item else { break };
            let chunk = chunk?;

            if let Some(content) = &chunk.content {
                merge_parts(&mut accumulated, &content.parts);
            }

            if chunk.partial {
                if let Some(content) = chunk.content {
                    sink.publish(self.new_event(ctx).with_content(content).as_partial())
                        .await?;
                }
                continue;
            }

            // Final chunk: the merged accumulator is the turn's content.
            let role = chunk
                .content
                .as_ref()
                .map(|c| c.role)
                .unwrap_or(Role::Assistant);
            let merged = Content::new(role, std::mem::take(&mut accumulated));
            let calls: Vec<Part> = merged.function_calls().into_iter().cloned().collect();

            if calls.is_empty() {
                sink.publish(self.new_event(ctx).with_content(merged).completed())
                    .await?;
                return Ok(());
            }

            if detectors::exceeds_turn_cap(calls.len(), self.config.max_tool_calls) {
                return Err(Error::ToolLimit);
            }

            sink.publish(self.new_event(ctx).with_content(merged)).await?;

            let response_event = executor::execute_batch(
                &self.name,
                &self.config,
                &self.tools,
                &self.callbacks,
                ctx,
                &calls,
                sink,
            )
            .await?;
            sink.publish(response_event).await?;

            return Box::pin(self.stream_round(ctx, sink, pending_user)).await;
        }

        // Stream ended without an explicit final chunk.
        let merged = Content::new(Role::Assistant, accumulated);
        sink.publish(self.new_event(ctx).with_content(merged).completed())
            .await?;
        Ok(())
    }

    // ── Simplified flow ────────────────────────────────────────────

    /// One model call, no tool dispatch. Tools are described inline in the
    /// instruction; a narrated tool attempt gets an advisory note.
    async fn run_simplified(&self, ctx: &InvocationContext, sink: &EventSink) -> Result<()> {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut pending_user = ctx.user_content.clone();
        let mut request = assembly::build_request(
            self.instruction.as_deref(),
            &ctx.session,
            pending_user.as_ref(),
            &self.tools,
            &self.config,
        );
        adapt::adapt_request(&ModelProfile::conservative(), &mut request);

        if let Some(cb) = &self.callbacks.before_model {
            cb(ctx, &mut request).map_err(|e| Error::Callback(format!("before_model: {e}")))?;
        }

        let mut response = self
            .retry_policy()
            .run(&ctx.cancel, || {
                let backend = self.backend.clone();
                let request = request.clone();
                async move { backend.generate(request).await }
            })
            .await?;

        if let Some(cb) = &self.callbacks.after_model {
            cb(ctx, &mut response).map_err(|e| Error::Callback(format!("after_model: {e}")))?;
        }

        if let Some(user) = pending_user.take() {
            self.record_user_content(ctx, user);
        }

        let mut text = response
            .content
            .map(|c| c.joined_text())
            .unwrap_or_default();
        if adapt::mentions_tool_use(&text) {
            text.push_str(adapt::TOOL_FALLBACK_NOTE);
        }

        sink.publish(
            self.new_event(ctx)
                .with_content(Content::assistant_text(text))
                .completed(),
        )
        .await?;
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent impl
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl Agent for LlmAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn sub_agents(&self) -> Vec<Arc<dyn Agent>> {
        self.sub_agents.clone()
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
            "invocation",
            agent = %self.name,
            invocation_id = %ctx.invocation_id,
        );

        tokio::spawn(
            async move {
                TraceEvent::InvocationStarted {
                    invocation_id: ctx.invocation_id.clone(),
                    agent: self.name.clone(),
                    streaming: self.config.streaming_enabled || ctx.run_config.streaming,
                }
                .emit();

                let sink = EventSink::for_invocation(tx, &ctx);
                match self.drive(&ctx, &sink).await {
                    Ok(()) => {}
                    // Cancellation closes the stream without a terminal
                    // event; the consumer sees the channel close.
                    Err(Error::Cancelled) => {
                        tracing::debug!("invocation cancelled, closing stream");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "invocation failed");
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
        self.backend.close().await;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Builder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Builds an [`LlmAgent`], surfacing configuration mistakes at build time
/// instead of mid-invocation.
pub struct LlmAgentBuilder {
    name: String,
    description: String,
    instruction: Option<String>,
    config: LlmAgentConfig,
    tools: ToolSet,
    backend: Option<Arc<dyn LlmBackend>>,
    callbacks: Callbacks,
    adapt_to_model: bool,
    fallback_to_simple: bool,
    retry_backoff: Backoff,
    sub_agents: Vec<Arc<dyn Agent>>,
}

impl LlmAgentBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            instruction: None,
            config: LlmAgentConfig::default(),
            tools: ToolSet::new(),
            backend: None,
            callbacks: Callbacks::default(),
            adapt_to_model: false,
            fallback_to_simple: false,
            retry_backoff: Backoff::default(),
            sub_agents: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    pub fn config(mut self, config: LlmAgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn backend(mut self, backend: Arc<dyn LlmBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.add(tool);
        self
    }

    pub fn tool_arc(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.add_arc(tool);
        self
    }

    pub fn callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn adapt_to_model(mut self, enabled: bool) -> Self {
        self.adapt_to_model = enabled;
        self
    }

    pub fn fallback_to_simple(mut self, enabled: bool) -> Self {
        self.fallback_to_simple = enabled;
        self
    }

    pub fn retry_backoff(mut self, backoff: Backoff) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn sub_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.sub_agents.push(agent);
        self
    }

    pub fn build(self) -> Result<Arc<LlmAgent>> {
        if self.name.is_empty() {
            return Err(Error::Config("agent name must not be empty".into()));
        }
        let backend = self
            .backend
            .ok_or_else(|| Error::Config("missing model backend".into()))?;
        if self.config.model.is_empty() {
            return Err(Error::Config("model name must not be empty".into()));
        }

        let agent = Arc::new(LlmAgent {
            name: self.name,
            description: self.description,
            instruction: self.instruction,
            config: self.config,
            tools: self.tools,
            backend,
            callbacks: self.callbacks,
            adapt_to_model: self.adapt_to_model,
            fallback_to_simple: self.fallback_to_simple,
            retry_backoff: self.retry_backoff,
            sub_agents: self.sub_agents,
            parent: RwLock::new(None),
        });

        let parent: Arc<dyn Agent> = agent.clone();
        for child in &agent.sub_agents {
            child.set_parent(Arc::downgrade(&parent));
        }

        Ok(agent)
    }
}

// ── Streaming helpers ──────────────────────────────────────────────

/// Fold chunk parts into the accumulator: successive text runs grow the
/// last text part, everything else is appended as-is.
fn merge_parts(accumulated: &mut Vec<Part>, parts: &[Part]) {
    for part in parts {
        match (accumulated.last_mut(), part) {
            (Some(Part::Text { text: tail }), Part::Text { text }) => {
                tail.push_str(text);
            }
            _ => accumulated.push(part.clone()),
        }
    }
}
