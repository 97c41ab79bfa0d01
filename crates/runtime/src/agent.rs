//! The [`Agent`] capability and event publication plumbing.

use std::sync::{Arc, Weak};

use tokio::sync::mpsc;

use af_domain::{Error, Event, Result};
use af_sessions::{InvocationContext, Session};

/// Capacity of the per-invocation event channel. A performance knob, not a
/// correctness knob — the driver blocks on a full channel, it never drops.
pub const EVENT_CHANNEL_CAPACITY: usize = 10;

/// Anything that can be driven by an invocation and produce an ordered
/// event stream.
///
/// `run` spawns the driver task and returns the consumer end immediately;
/// the stream closes when the invocation terminates. Parents exclusively
/// own their sub-agents; children hold only a weak back-reference, wired
/// by the composing builder via [`set_parent`](Agent::set_parent).
#[async_trait::async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn sub_agents(&self) -> Vec<Arc<dyn Agent>> {
        Vec::new()
    }

    fn parent(&self) -> Option<Arc<dyn Agent>> {
        None
    }

    /// Install the weak back-reference to the owning parent. No-op for
    /// agents that do not track their parent.
    fn set_parent(&self, _parent: Weak<dyn Agent>) {}

    /// Drive one invocation, publishing events to the returned channel.
    fn run(self: Arc<Self>, ctx: InvocationContext) -> mpsc::Receiver<Event>;

    /// Release held resources (backend connections, transports).
    async fn cleanup(&self) {}
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EventSink — publish + append in lock-step
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Couples the invocation's event channel with its session so that every
/// published non-partial event is also appended to the log, in the same
/// order.
///
/// Before anything else, the invocation's metadata and branch label are
/// stamped onto the event, so the appended copy already carries workflow
/// tags. Partial events (streaming chunks, long-running-tool signals) are
/// emitted without being appended. Events already present in the log
/// (forwarded from a child that appended them itself) are not re-appended.
pub struct EventSink {
    tx: mpsc::Sender<Event>,
    session: Arc<Session>,
    metadata: std::collections::HashMap<String, serde_json::Value>,
    branch: Option<String>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<Event>, session: Arc<Session>) -> Self {
        Self {
            tx,
            session,
            metadata: Default::default(),
            branch: None,
        }
    }

    /// Sink for one invocation: published events inherit the context's
    /// metadata (unless they set a key themselves) and its branch label
    /// (unless they carry their own).
    pub fn for_invocation(tx: mpsc::Sender<Event>, ctx: &InvocationContext) -> Self {
        Self {
            tx,
            session: ctx.session.clone(),
            metadata: ctx.metadata.clone(),
            branch: ctx.branch.clone(),
        }
    }

    /// Publish an event. Blocks while the consumer is slow; a dropped
    /// consumer surfaces as [`Error::Cancelled`] so the driver unwinds.
    pub async fn publish(&self, mut event: Event) -> Result<()> {
        for (key, value) in &self.metadata {
            event
                .metadata
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        if event.branch.is_none() {
            event.branch = self.branch.clone();
        }

        if !event.partial && !self.session.contains_event(&event.id) {
            self.session.append(event.clone());
        }
        self.tx
            .send(event)
            .await
            .map_err(|_| Error::Cancelled)
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}
