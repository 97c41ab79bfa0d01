//! Tool execution pipeline — resolves, validates, times out, and shapes
//! the results of one function-call batch into a single agent-authored
//! response event.

use std::time::Instant;

use serde_json::{Map, Value};
use tracing::Instrument;

use af_domain::trace::TraceEvent;
use af_domain::{Content, Error, Event, EventActions, LlmAgentConfig, Part, Result, Role};
use af_sessions::InvocationContext;
use af_tools::{ToolContext, ToolSet};

use crate::agent::EventSink;
use crate::callbacks::Callbacks;

/// Execute a batch of function-call parts sequentially, in declaration
/// order, and return the combined response event (not yet published).
///
/// Individual tool failures become `{"error": …}` response bodies; only
/// callback failures and cancellation abort the batch.
pub(crate) async fn execute_batch(
    agent_name: &str,
    config: &LlmAgentConfig,
    tools: &ToolSet,
    callbacks: &Callbacks,
    invocation: &InvocationContext,
    calls: &[Part],
    sink: &EventSink,
) -> Result<Event> {
    let mut response_parts = Vec::with_capacity(calls.len());
    let mut batch_actions = EventActions::default();
    let mut long_running_ids = Vec::new();

    for part in calls {
        let Part::FunctionCall { id, name, args } = part else {
            continue;
        };

        if invocation.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let Some(tool) = tools.get(name) else {
            tracing::warn!(tool = %name, call_id = %id, "model requested unknown tool");
            let mut body = Map::new();
            body.insert("error".into(), Value::String(format!("Unknown tool: {name}")));
            response_parts.push(Part::function_response(id.clone(), name.clone(), body));
            continue;
        };

        let mut tool_ctx = ToolContext::new(invocation.clone(), id.clone(), name.clone());
        let mut args = args.clone();

        if let Some(cb) = &callbacks.before_tool {
            cb(&tool_ctx, &mut args)
                .map_err(|e| Error::Callback(format!("before_tool: {e}")))?;
        }

        let span = tracing::info_span!("tool.call", tool_name = %name, call_id = %id);
        let started = Instant::now();
        let outcome: Result<Value> = tokio::select! {
            _ = invocation.cancel.cancelled() => return Err(Error::Cancelled),
            result = tokio::time::timeout(config.tool_call_timeout(), tool.run(args, &mut tool_ctx))
                .instrument(span) =>
            {
                match result {
                    Ok(inner) => inner,
                    Err(_) => Err(Error::Timeout(format!(
                        "tool '{name}' exceeded {}ms",
                        config.tool_call_timeout_ms
                    ))),
                }
            }
        };

        let is_error = outcome.is_err();
        let body = shape_response(outcome);

        TraceEvent::ToolDispatched {
            invocation_id: invocation.invocation_id.clone(),
            call_id: id.clone(),
            tool_name: name.clone(),
            duration_ms: started.elapsed().as_millis() as u64,
            is_error,
        }
        .emit();

        if !tool_ctx.state_delta().is_empty() {
            invocation.session.apply_state_delta(tool_ctx.state_delta());
        }

        if tool.is_long_running() {
            let signal = Event::new(&invocation.invocation_id, agent_name).as_partial();
            let mut signal = match &invocation.branch {
                Some(branch) => signal.with_branch(branch.clone()),
                None => signal,
            };
            signal.long_running_tool_ids = vec![id.clone()];
            sink.publish(signal).await?;
            long_running_ids.push(id.clone());
        }

        merge_actions(&mut batch_actions, tool_ctx.into_actions());
        response_parts.push(Part::function_response(id.clone(), name.clone(), body));
    }

    let mut event = Event::new(&invocation.invocation_id, agent_name)
        .with_content(Content::new(Role::Agent, response_parts.clone()))
        .with_actions(batch_actions);
    event.long_running_tool_ids = long_running_ids;
    if let Some(branch) = &invocation.branch {
        event.branch = Some(branch.clone());
    }

    if let Some(cb) = &callbacks.after_tool {
        for part in &response_parts {
            let synthesized = Event::new(&invocation.invocation_id, agent_name)
                .with_content(Content::new(Role::Agent, vec![part.clone()]));
            cb(invocation, &synthesized)
                .map_err(|e| Error::Callback(format!("after_tool: {e}")))?;
        }
    }

    Ok(event)
}

/// A returned object is the response body verbatim; anything else is
/// wrapped; errors are surfaced in-band.
fn shape_response(outcome: Result<Value>) -> Map<String, Value> {
    match outcome {
        Ok(Value::Object(map)) => map,
        Ok(value) => {
            let mut body = Map::new();
            body.insert("result".into(), value);
            body
        }
        Err(e) => {
            let mut body = Map::new();
            body.insert("error".into(), Value::String(e.to_string()));
            body
        }
    }
}

fn merge_actions(batch: &mut EventActions, call: EventActions) {
    for (key, value) in call.state_delta {
        batch.state_delta.insert(key, value);
    }
    for (key, value) in call.artifact_delta {
        batch.artifact_delta.insert(key, value);
    }
    batch.escalate |= call.escalate;
    if call.transfer_to.is_some() {
        batch.transfer_to = call.transfer_to;
    }
}
