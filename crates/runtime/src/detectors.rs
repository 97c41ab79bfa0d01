//! Loop / termination detectors.
//!
//! Three independent checkers with per-invocation state, composed by the
//! flow driver at fixed points:
//!
//! * [`CallBudget`] — total function calls across the invocation, soft cap.
//! * [`exceeds_turn_cap`] — per-turn batch size, hard error.
//! * [`RepeatDetector`] — consecutive identical first-call names, soft cap.

use af_domain::{Event, Role};
use af_sessions::Session;

/// Final text published when the call budget trips.
pub const MAX_CALLS_MESSAGE: &str = "I've reached the maximum number of tool calls. \
Let me provide a direct response based on the information I have.";

/// Final text published when the repeat detector trips.
pub const REPEAT_MESSAGE: &str = "I've completed the tool execution. \
Based on the results, I can provide you with the information you requested.";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Call budget (soft flex limit)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Running sum of function-call parts the invocation has seen. Trips when
/// the sum exceeds twice the per-turn cap; the batch that trips is counted
/// but never dispatched.
pub struct CallBudget {
    max_tool_calls: usize,
    observed: usize,
}

impl CallBudget {
    pub fn new(max_tool_calls: usize) -> Self {
        Self {
            max_tool_calls,
            observed: 0,
        }
    }

    /// Record a batch. Returns `true` when the soft cap is now exceeded.
    pub fn observe(&mut self, batch_len: usize) -> bool {
        self.observed += batch_len;
        self.observed > 2 * self.max_tool_calls
    }

    pub fn observed(&self) -> usize {
        self.observed
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Per-turn cap (hard limit)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Whether a single turn's batch breaks the hard per-turn limit.
pub fn exceeds_turn_cap(batch_len: usize, max_tool_calls: usize) -> bool {
    batch_len > max_tool_calls
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Repeat detector
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Detects an agent stuck re-issuing the same tool.
///
/// Inspects the session's recent tail after each tool batch: among
/// assistant events that carry function calls, three successive identical
/// first-call names trip the detector. Inactive for the first turns so a
/// legitimate short tool chain is never cut off.
pub struct RepeatDetector {
    window: usize,
    run_length: usize,
    min_turns: usize,
    min_events: usize,
}

impl Default for RepeatDetector {
    fn default() -> Self {
        Self {
            window: 6,
            run_length: 3,
            min_turns: 3,
            min_events: 4,
        }
    }
}

impl RepeatDetector {
    /// `turns_completed` counts finished turns, 1-based.
    pub fn tripped(&self, turns_completed: usize, session: &Session) -> bool {
        if turns_completed < self.min_turns || session.event_count() < self.min_events {
            return false;
        }

        let recent = session.last_events(self.window);
        let names: Vec<String> = recent
            .iter()
            .filter(|e| Self::is_assistant_call(e))
            .filter_map(|e| {
                e.content
                    .as_ref()
                    .and_then(|c| c.first_call_name())
                    .map(str::to_string)
            })
            .collect();

        names
            .windows(self.run_length)
            .any(|w| w.iter().all(|n| n == &w[0]))
    }

    fn is_assistant_call(event: &Event) -> bool {
        event
            .content
            .as_ref()
            .map(|c| c.role == Role::Assistant && c.has_function_calls())
            .unwrap_or(false)
    }
}
