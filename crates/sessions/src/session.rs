use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::{Map, Value};

use af_domain::trace::TraceEvent;
use af_domain::Event;

/// An append-only event log plus session state.
///
/// Identity is `(app, user, id)`. State is mutated only by applying a
/// non-empty `state_delta` from an appended event (the tool pipeline may
/// apply the same delta ahead of the append; a key→value patch is
/// idempotent, so the replay at append time is harmless).
///
/// A single invocation is the unit of serialization — the log is not
/// required to be safe under concurrent writer invocations.
#[derive(Debug)]
pub struct Session {
    app: String,
    user: String,
    id: String,
    events: RwLock<Vec<Event>>,
    state: RwLock<HashMap<String, Value>>,
}

impl Session {
    pub fn new(app: impl Into<String>, user: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            user: user.into(),
            id: id.into(),
            events: RwLock::new(Vec::new()),
            state: RwLock::new(HashMap::new()),
        }
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Append an event, applying its `state_delta` first.
    pub fn append(&self, event: Event) {
        if !event.actions.state_delta.is_empty() {
            self.apply_state_delta(&event.actions.state_delta);
        }

        let event_id = event.id.clone();
        self.events.write().push(event);

        TraceEvent::SessionAppend {
            session_id: self.id.clone(),
            event_id,
            state_keys: self.state.read().len(),
        }
        .emit();
    }

    /// Merge a key→value patch into session state.
    pub fn apply_state_delta(&self, delta: &Map<String, Value>) {
        let mut state = self.state.write();
        for (key, value) in delta {
            state.insert(key.clone(), value.clone());
        }
    }

    /// Snapshot of the full event log.
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Snapshot of the last `n` events (fewer if the log is shorter).
    pub fn last_events(&self, n: usize) -> Vec<Event> {
        let events = self.events.read();
        let start = events.len().saturating_sub(n);
        events[start..].to_vec()
    }

    pub fn last_event(&self) -> Option<Event> {
        self.events.read().last().cloned()
    }

    /// Whether an event with this id is already in the log.
    pub fn contains_event(&self, event_id: &str) -> bool {
        self.events.read().iter().any(|e| e.id == event_id)
    }

    pub fn event_count(&self) -> usize {
        self.events.read().len()
    }

    /// Snapshot of the state map.
    pub fn state(&self) -> HashMap<String, Value> {
        self.state.read().clone()
    }

    pub fn state_value(&self, key: &str) -> Option<Value> {
        self.state.read().get(key).cloned()
    }
}
