//! Sequential workflow agent — runs an ordered list of children for up to
//! `max_rounds` round-robin rounds over a shared session.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::Instrument;

use af_domain::{Content, Error, Event, Result, Role, SequentialConfig};
use af_sessions::InvocationContext;

use crate::agent::{Agent, EventSink, EVENT_CHANNEL_CAPACITY};

/// Composes children into rounds, sharing session history and tagging
/// every forwarded event with `a2a:*` workflow metadata.
pub struct SequentialAgent {
    name: String,
    description: String,
    config: SequentialConfig,
    children: Vec<Arc<dyn Agent>>,
    parent: RwLock<Option<Weak<dyn Agent>>>,
}

impl SequentialAgent {
    pub fn builder(name: impl Into<String>) -> SequentialAgentBuilder {
        SequentialAgentBuilder::new(name)
    }

    pub fn config(&self) -> &SequentialConfig {
        &self.config
    }

    async fn run_workflow(&self, ctx: &InvocationContext, sink: &EventSink) -> Result<()> {
        self.record_initial_user(ctx);

        let mut rounds_run = 0;
        for round in 0..self.config.max_rounds {
            let mut round_last: Option<Event> = None;

            for (index, child) in self.children.iter().enumerate() {
                if ctx.is_cancelled() {
                    return Err(Error::Cancelled);
                }

                let branch = format!("{}.{}.R{}", self.name, child.name(), round + 1);
                let mut child_ctx = ctx.child(child.name()).with_branch(branch.clone());
                // The child publishes (and appends) through its own sink,
                // so the workflow tags ride in its invocation context.
                self.insert_workflow_tags(&mut child_ctx.metadata, round, index, child.name());

                let mut user_content = self.child_user_content(ctx);
                if self.config.add_turn_markers && user_content.is_none() {
                    user_content = Some(Content::user_text(format!(
                        "Continue the conversation. This is round {}, agent {} turn.",
                        round + 1,
                        child.name()
                    )));
                }
                child_ctx.user_content = user_content;

                tracing::debug!(
                    round = round + 1,
                    agent = child.name(),
                    "starting workflow child"
                );

                let mut child_rx = child.clone().run(child_ctx);
                let mut child_error: Option<String> = None;

                while let Some(mut event) = child_rx.recv().await {
                    self.tag_event(&mut event, round, index, child.name(), &branch);
                    if let Some(message) = &event.error {
                        child_error = Some(message.clone());
                    }
                    round_last = Some(event.clone());
                    sink.publish(event).await?;
                }

                if let Some(message) = child_error {
                    if self.config.stop_on_error {
                        return Err(Error::Other(format!(
                            "workflow child '{}' failed: {message}",
                            child.name()
                        )));
                    }
                    tracing::warn!(
                        agent = child.name(),
                        error = %message,
                        "workflow child failed, continuing"
                    );
                }
            }

            rounds_run = round + 1;

            if let Some(last) = &round_last {
                if last.turn_complete || last.actions.escalate {
                    tracing::debug!(round = rounds_run, "workflow finished early");
                    break;
                }
            }
        }

        let summary = format!(
            "Sequential workflow complete: {} agents over {} rounds.",
            self.children.len(),
            rounds_run
        );
        let completion = Event::new(&ctx.invocation_id, &self.name)
            .with_content(Content::agent_text(summary))
            .with_metadata("a2a:sequential_agent", json!(self.name))
            .with_metadata("a2a:rounds", json!(rounds_run))
            .completed();
        sink.publish(completion).await?;
        Ok(())
    }

    /// Synthesize the initial user event unless the session tail already
    /// records it.
    fn record_initial_user(&self, ctx: &InvocationContext) {
        let Some(user) = &ctx.user_content else {
            return;
        };

        let tail_matches = ctx
            .session
            .last_event()
            .and_then(|e| e.content)
            .map(|c| c.role == Role::User && c.first_text() == user.first_text())
            .unwrap_or(false);
        if tail_matches {
            return;
        }

        let event = Event::new(&ctx.invocation_id, "user")
            .with_content(user.clone())
            .with_metadata("a2a:role", json!("user"))
            .with_metadata("a2a:turn", json!(0))
            .with_metadata("a2a:agent_type", json!("sequential"));
        ctx.session.append(event);
    }

    /// Input for one child turn, per configuration: full history (none),
    /// the most recent text content, or a synthesized turn marker.
    fn child_user_content(&self, ctx: &InvocationContext) -> Option<Content> {
        if !self.config.pass_complete_history {
            let recent_text = ctx
                .session
                .events()
                .iter()
                .rev()
                .filter_map(|e| e.content.clone())
                .find(|c| c.first_text().is_some());
            if let Some(content) = recent_text.or_else(|| ctx.user_content.clone()) {
                return Some(content);
            }
        }
        None
    }

    fn insert_workflow_tags(
        &self,
        metadata: &mut std::collections::HashMap<String, serde_json::Value>,
        round: usize,
        index: usize,
        child: &str,
    ) {
        metadata.insert("a2a:sequential_agent".into(), json!(self.name));
        metadata.insert("a2a:round".into(), json!(round + 1));
        metadata.insert("a2a:agent_index".into(), json!(index));
        metadata.insert("a2a:agent_name".into(), json!(child));
        metadata.insert("a2a:role".into(), json!("agent"));
    }

    /// Applied to forwarded events as well, covering children that do not
    /// stamp their context metadata when publishing.
    fn tag_event(&self, event: &mut Event, round: usize, index: usize, child: &str, branch: &str) {
        self.insert_workflow_tags(&mut event.metadata, round, index, child);
        if event.branch.is_none() {
            event.branch = Some(branch.to_string());
        }
    }
}

#[async_trait::async_trait]
impl Agent for SequentialAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn sub_agents(&self) -> Vec<Arc<dyn Agent>> {
        self.children.clone()
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
            "workflow",
            agent = %self.name,
            invocation_id = %ctx.invocation_id,
        );

        tokio::spawn(
            async move {
                let sink = EventSink::for_invocation(tx, &ctx);
                match self.run_workflow(&ctx, &sink).await {
                    Ok(()) => {}
                    // Cancellation closes the stream without a terminal
                    // event; the consumer sees the channel close.
                    Err(Error::Cancelled) => {
                        tracing::debug!("workflow cancelled, closing stream");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "workflow failed");
                        let event =
                            Event::new(&ctx.invocation_id, &self.name).with_error(e.to_string());
                        let _ = sink.publish(event).await;
                    }
                }
            }
            .instrument(span),
        );

        rx
    }

    async fn cleanup(&self) {
        for child in &self.children {
            child.cleanup().await;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Builder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SequentialAgentBuilder {
    name: String,
    description: String,
    config: SequentialConfig,
    children: Vec<Arc<dyn Agent>>,
}

impl SequentialAgentBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            config: SequentialConfig::default(),
            children: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn config(mut self, config: SequentialConfig) -> Self {
        self.config = config;
        self
    }

    pub fn child(mut self, agent: Arc<dyn Agent>) -> Self {
        self.children.push(agent);
        self
    }

    pub fn build(self) -> Result<Arc<SequentialAgent>> {
        if self.name.is_empty() {
            return Err(Error::Config("workflow name must not be empty".into()));
        }
        if self.children.is_empty() {
            return Err(Error::Config(
                "sequential workflow needs at least one child".into(),
            ));
        }

        let agent = Arc::new(SequentialAgent {
            name: self.name,
            description: self.description,
            config: self.config,
            children: self.children,
            parent: RwLock::new(None),
        });

        let parent: Arc<dyn Agent> = agent.clone();
        for child in &agent.children {
            child.set_parent(Arc::downgrade(&parent));
        }

        Ok(agent)
    }
}
