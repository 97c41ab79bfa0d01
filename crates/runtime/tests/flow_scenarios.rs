//! End-to-end scenarios for the conversation flow driver.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;

use af_domain::{Content, Error, LlmAgentConfig, Part, Role, RunConfig};
use af_runtime::{Agent, Callbacks, LlmAgent};
use af_sessions::{InvocationContext, Session};

use common::*;

fn base_config() -> LlmAgentConfig {
    LlmAgentConfig {
        model: "gemini-2.0-flash".into(),
        ..LlmAgentConfig::default()
    }
}

fn new_session() -> Arc<Session> {
    init_tracing();
    Arc::new(Session::new("app", "alice", "s1"))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 1 — happy text path
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn happy_text_path_emits_one_final_event() {
    let backend = ScriptedBackend::scripted(vec![Ok(text_response("Hello!"))]);
    let agent = LlmAgent::builder("assistant")
        .config(base_config())
        .backend(backend.clone())
        .build()
        .unwrap();

    let session = new_session();
    let ctx = InvocationContext::new("assistant", session.clone(), Some(Content::user_text("Hi")));
    let events = collect_events(agent.run(ctx)).await;

    assert_eq!(events.len(), 1);
    let final_event = &events[0];
    assert!(final_event.turn_complete);
    assert_eq!(final_event.role(), Some(Role::Assistant));
    assert_eq!(
        final_event.content.as_ref().unwrap().first_text(),
        Some("Hello!")
    );

    // The synthesized user event precedes the final event in the log.
    let logged = session.events();
    assert_eq!(logged.len(), 2);
    assert_eq!(logged[0].author, "user");
    assert_eq!(logged[1].id, final_event.id);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 2 — single tool call
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn single_tool_call_round_trip() {
    let backend = ScriptedBackend::scripted(vec![
        Ok(call_response("c1", "echo", json!({"x": "hi"}))),
        Ok(text_response("Done: hi")),
    ]);
    let invocations = Arc::new(AtomicUsize::new(0));
    let agent = LlmAgent::builder("assistant")
        .config(base_config())
        .backend(backend.clone())
        .tool(echo_tool(invocations.clone()))
        .build()
        .unwrap();

    let session = new_session();
    let ctx = InvocationContext::new(
        "assistant",
        session.clone(),
        Some(Content::user_text("echo please")),
    );
    let events = collect_events(agent.run(ctx)).await;

    assert_eq!(events.len(), 3);

    // (a) the function-call event
    assert!(events[0].content.as_ref().unwrap().has_function_calls());

    // (b) the agent-authored response event with the paired id
    assert_eq!(events[1].role(), Some(Role::Agent));
    match &events[1].content.as_ref().unwrap().parts[0] {
        Part::FunctionResponse { id, name, response } => {
            assert_eq!(id, "c1");
            assert_eq!(name, "echo");
            assert_eq!(response["echoed"], json!("hi"));
        }
        other => panic!("expected function response, got {other:?}"),
    }

    // (c) the final text event
    assert!(events[2].turn_complete);
    assert_eq!(
        events[2].content.as_ref().unwrap().first_text(),
        Some("Done: hi")
    );

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn emitted_events_match_the_session_tail() {
    let backend = ScriptedBackend::scripted(vec![
        Ok(call_response("c1", "echo", json!({"x": "hi"}))),
        Ok(text_response("Done")),
    ]);
    let agent = LlmAgent::builder("assistant")
        .config(base_config())
        .backend(backend)
        .tool(echo_tool(Arc::new(AtomicUsize::new(0))))
        .build()
        .unwrap();

    let session = new_session();
    let ctx = InvocationContext::new("assistant", session.clone(), Some(Content::user_text("go")));
    let events = collect_events(agent.run(ctx)).await;

    // Emitted order equals append order (after the synthesized user event).
    let logged = session.events();
    let emitted_ids: Vec<_> = events.iter().map(|e| e.id.clone()).collect();
    let logged_ids: Vec<_> = logged[1..].iter().map(|e| e.id.clone()).collect();
    assert_eq!(emitted_ids, logged_ids);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 3 — repeat detector (D3)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn repeated_tool_calls_trip_the_repeat_detector() {
    let backend = ScriptedBackend::scripted(vec![
        Ok(call_response("c1", "search", json!({"q": "x"}))),
        Ok(call_response("c2", "search", json!({"q": "x"}))),
        Ok(call_response("c3", "search", json!({"q": "x"}))),
    ]);
    let invocations = Arc::new(AtomicUsize::new(0));
    let agent = LlmAgent::builder("assistant")
        .config(base_config())
        .backend(backend)
        .tool(counting_tool(
            "search",
            invocations.clone(),
            json!({"results": []}),
        ))
        .build()
        .unwrap();

    let session = new_session();
    let ctx = InvocationContext::new("assistant", session, Some(Content::user_text("find x")));
    let events = collect_events(agent.run(ctx)).await;

    // 3 call events + 3 response events + graceful final.
    assert_eq!(events.len(), 7);
    let final_event = events.last().unwrap();
    assert!(final_event.turn_complete);
    assert!(final_event
        .content
        .as_ref()
        .unwrap()
        .first_text()
        .unwrap()
        .contains("completed the tool execution"));

    assert_eq!(invocations.load(Ordering::SeqCst), 3);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 4 — call budget (D1)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn alternating_calls_trip_the_call_budget() {
    let config = LlmAgentConfig {
        max_tool_calls: 1,
        ..base_config()
    };
    let backend = ScriptedBackend::scripted_with_default(
        vec![
            Ok(call_response("c1", "search", json!({"q": "a"}))),
            Ok(call_response("c2", "fetch", json!({"url": "b"}))),
        ],
        call_response("cN", "search", json!({"q": "again"})),
    );
    let invocations = Arc::new(AtomicUsize::new(0));
    let agent = LlmAgent::builder("assistant")
        .config(config)
        .backend(backend)
        .tool(counting_tool("search", invocations.clone(), json!({"hits": 0})))
        .tool(counting_tool("fetch", invocations.clone(), json!({"body": ""})))
        .build()
        .unwrap();

    let session = new_session();
    let ctx = InvocationContext::new("assistant", session, Some(Content::user_text("dig in")));
    let events = collect_events(agent.run(ctx)).await;

    // Soft cap = 2: two dispatched batches, then the graceful final event.
    assert_eq!(events.len(), 5);
    let final_event = events.last().unwrap();
    assert!(final_event.turn_complete);
    assert!(final_event
        .content
        .as_ref()
        .unwrap()
        .first_text()
        .unwrap()
        .contains("maximum number of tool calls"));

    assert!(invocations.load(Ordering::SeqCst) <= 3);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 5 — unknown tool
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn unknown_tool_yields_error_response_and_continues() {
    let backend = ScriptedBackend::scripted(vec![
        Ok(call_response("c1", "ghost", json!({}))),
        Ok(text_response("Recovered.")),
    ]);
    let agent = LlmAgent::builder("assistant")
        .config(base_config())
        .backend(backend)
        .build()
        .unwrap();

    let session = new_session();
    let ctx = InvocationContext::new("assistant", session, Some(Content::user_text("haunt")));
    let events = collect_events(agent.run(ctx)).await;

    assert_eq!(events.len(), 3);
    assert_eq!(
        function_response_body(&events[1], 0)["error"],
        json!("Unknown tool: ghost")
    );
    assert!(events[2].turn_complete);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Boundary behaviors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn zero_max_tool_calls_is_a_hard_error() {
    let config = LlmAgentConfig {
        max_tool_calls: 0,
        ..base_config()
    };
    let backend = ScriptedBackend::scripted(vec![Ok(call_response("c1", "echo", json!({})))]);
    let agent = LlmAgent::builder("assistant")
        .config(config)
        .backend(backend)
        .tool(echo_tool(Arc::new(AtomicUsize::new(0))))
        .build()
        .unwrap();

    let session = new_session();
    let ctx = InvocationContext::new("assistant", session, Some(Content::user_text("go")));
    let events = collect_events(agent.run(ctx)).await;

    assert_eq!(events.len(), 1);
    let error = events[0].error.as_deref().unwrap();
    assert!(error.contains("too many tool calls"));
    assert!(!events[0].turn_complete);
}

#[tokio::test]
async fn single_retry_attempt_surfaces_transient_error() {
    let config = LlmAgentConfig {
        retry_attempts: 1,
        ..base_config()
    };
    let backend =
        ScriptedBackend::scripted(vec![Err(Error::Model("connection reset by peer".into()))]);
    let agent = LlmAgent::builder("assistant")
        .config(config)
        .backend(backend.clone())
        .build()
        .unwrap();

    let session = new_session();
    let ctx = InvocationContext::new("assistant", session, Some(Content::user_text("hi")));
    let events = collect_events(agent.run(ctx)).await;

    assert_eq!(backend.calls(), 1);
    assert_eq!(events.len(), 1);
    assert!(events[0].error.as_deref().unwrap().contains("connection"));
}

#[tokio::test]
async fn transient_errors_are_retried_to_success() {
    let backend = ScriptedBackend::scripted(vec![
        Err(Error::Model("HTTP 503 from upstream".into())),
        Ok(text_response("Second try worked.")),
    ]);
    let agent = LlmAgent::builder("assistant")
        .config(base_config())
        .backend(backend.clone())
        .retry_backoff(af_models::Backoff::Fixed {
            delay: std::time::Duration::from_millis(1),
        })
        .build()
        .unwrap();

    let session = new_session();
    let ctx = InvocationContext::new("assistant", session, Some(Content::user_text("hi")));
    let events = collect_events(agent.run(ctx)).await;

    assert_eq!(backend.calls(), 2);
    assert_eq!(events.len(), 1);
    assert!(events[0].turn_complete);
}

#[tokio::test]
async fn cancellation_before_the_first_turn_emits_nothing() {
    let backend = ScriptedBackend::scripted(vec![Ok(text_response("never sent"))]);
    let agent = LlmAgent::builder("assistant")
        .config(base_config())
        .backend(backend.clone())
        .build()
        .unwrap();

    let session = new_session();
    let ctx = InvocationContext::new("assistant", session, Some(Content::user_text("hi")));
    ctx.cancel.cancel();
    let events = collect_events(agent.run(ctx)).await;

    assert!(events.is_empty());
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn turn_cap_exhaustion_stops_silently() {
    let backend = ScriptedBackend::scripted_with_default(
        vec![],
        call_response("c1", "echo", json!({"x": "loop"})),
    );
    let invocations = Arc::new(AtomicUsize::new(0));
    let agent = LlmAgent::builder("assistant")
        .config(base_config())
        .backend(backend.clone())
        .tool(echo_tool(invocations.clone()))
        .build()
        .unwrap();

    let session = new_session();
    let ctx = InvocationContext::new("assistant", session, Some(Content::user_text("go")))
        .with_run_config(RunConfig {
            max_turns: 2,
            streaming: false,
        });
    let events = collect_events(agent.run(ctx)).await;

    // Two full turns (call + response each), no terminal event.
    assert_eq!(events.len(), 4);
    assert!(events.iter().all(|e| !e.turn_complete && e.error.is_none()));
    assert_eq!(invocations.load(Ordering::SeqCst), 2);
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn duplicate_user_content_is_sent_once() {
    let backend = ScriptedBackend::scripted(vec![Ok(text_response("Hello!"))]);
    let agent = LlmAgent::builder("assistant")
        .config(base_config())
        .backend(backend.clone())
        .build()
        .unwrap();

    let session = new_session();
    // The caller already recorded the user message in the session.
    session.append(
        af_domain::Event::new("prior", "user").with_content(Content::user_text("Hi")),
    );

    let ctx = InvocationContext::new("assistant", session.clone(), Some(Content::user_text("Hi")));
    collect_events(agent.run(ctx)).await;

    let request = &backend.requests()[0];
    let user_count = request
        .contents
        .iter()
        .filter(|c| c.role == Role::User)
        .count();
    assert_eq!(user_count, 1);

    // And the session did not get a second user event.
    let user_events = session
        .events()
        .iter()
        .filter(|e| e.author == "user")
        .count();
    assert_eq!(user_events, 1);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Callbacks and state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn before_model_callback_failure_is_fatal() {
    let backend = ScriptedBackend::scripted(vec![Ok(text_response("unreachable"))]);
    let callbacks = Callbacks {
        before_model: Some(Arc::new(|_, _| Err(Error::Other("rejected".into())))),
        ..Callbacks::default()
    };
    let agent = LlmAgent::builder("assistant")
        .config(base_config())
        .backend(backend.clone())
        .callbacks(callbacks)
        .build()
        .unwrap();

    let session = new_session();
    let ctx = InvocationContext::new("assistant", session, Some(Content::user_text("hi")));
    let events = collect_events(agent.run(ctx)).await;

    assert_eq!(events.len(), 1);
    assert!(events[0].error.as_deref().unwrap().contains("before_model"));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn after_model_callback_can_rewrite_the_response() {
    let backend = ScriptedBackend::scripted(vec![Ok(text_response("original"))]);
    let callbacks = Callbacks {
        after_model: Some(Arc::new(|_, response| {
            response.content = Some(Content::assistant_text("rewritten"));
            Ok(())
        })),
        ..Callbacks::default()
    };
    let agent = LlmAgent::builder("assistant")
        .config(base_config())
        .backend(backend)
        .callbacks(callbacks)
        .build()
        .unwrap();

    let session = new_session();
    let ctx = InvocationContext::new("assistant", session, Some(Content::user_text("hi")));
    let events = collect_events(agent.run(ctx)).await;

    assert_eq!(
        events[0].content.as_ref().unwrap().first_text(),
        Some("rewritten")
    );
}

#[tokio::test]
async fn tool_state_delta_reaches_session_state() {
    let backend = ScriptedBackend::scripted(vec![
        Ok(call_response("c1", "remember", json!({}))),
        Ok(text_response("Noted.")),
    ]);
    let agent = LlmAgent::builder("assistant")
        .config(base_config())
        .backend(backend)
        .tool(af_tools::FunctionTool::new(
            "remember",
            "store a fact",
            json!({"type": "object"}),
            |_, ctx| {
                ctx.set_state("fact", json!("water is wet"));
                Box::pin(async move { Ok(json!({"ok": true})) })
            },
        ))
        .build()
        .unwrap();

    let session = new_session();
    let ctx = InvocationContext::new("assistant", session.clone(), Some(Content::user_text("hi")));
    collect_events(agent.run(ctx)).await;

    assert_eq!(
        session.state_value("fact"),
        Some(json!("water is wet"))
    );
}

#[tokio::test]
async fn function_responses_pair_with_earlier_calls() {
    let backend = ScriptedBackend::scripted(vec![
        Ok(call_response("c1", "echo", json!({"x": "1"}))),
        Ok(call_response("c2", "ghost", json!({}))),
        Ok(text_response("done")),
    ]);
    let agent = LlmAgent::builder("assistant")
        .config(base_config())
        .backend(backend)
        .tool(echo_tool(Arc::new(AtomicUsize::new(0))))
        .build()
        .unwrap();

    let session = new_session();
    let ctx = InvocationContext::new("assistant", session.clone(), Some(Content::user_text("go")));
    collect_events(agent.run(ctx)).await;

    // Every response part in the log pairs with an earlier call part.
    let mut seen_call_ids = Vec::new();
    for event in session.events() {
        let Some(content) = &event.content else {
            continue;
        };
        for part in &content.parts {
            match part {
                Part::FunctionCall { id, .. } => seen_call_ids.push(id.clone()),
                Part::FunctionResponse { id, .. } => {
                    assert!(seen_call_ids.contains(id), "unpaired response id {id}");
                }
                Part::Text { .. } => {}
            }
        }
    }
}
