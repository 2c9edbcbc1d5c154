use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use weave_agent::LlmAgent;
use weave_core::{Agent, AgentConfig, AgentStatus, ProgressSink, RpcCode};
use weave_judge::{AggregationStrategy, EvaluationContext, JudgeConfig};
use weave_llm::ScriptedProvider;
use weave_trace::{Span, SpanStatus, SpanStatusCode, TraceStore, Tracer};

use crate::handlers::weave::{run_weave, WeaveRequest};
use crate::hitl::{ClarificationRequest, PermissionRequest};
use crate::lifecycle::{CreateAgentRequest, ReloadAgentRequest};
use crate::state::{ServerConfig, ServerState};

fn test_state() -> Arc<ServerState> {
    Arc::new(ServerState::new(
        Arc::new(ScriptedProvider::new()),
        ServerConfig::default(),
    ))
}

fn inline_config(name: &str) -> CreateAgentRequest {
    CreateAgentRequest {
        config: Some(AgentConfig::new(name)),
        config_path: None,
    }
}

async fn wait_for<F: Fn() -> bool>(cond: F) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

// --- lifecycle ---

#[tokio::test]
async fn create_requires_exactly_one_config_source() {
    let state = test_state();

    let err = state
        .create_agent_from_config(CreateAgentRequest::default())
        .await
        .expect_err("neither");
    assert_eq!(err.code, RpcCode::InvalidArgument);

    let err = state
        .create_agent_from_config(CreateAgentRequest {
            config: Some(AgentConfig::new("a")),
            config_path: Some("/tmp/agent.yaml".to_string()),
        })
        .await
        .expect_err("both");
    assert_eq!(err.code, RpcCode::InvalidArgument);
}

#[tokio::test]
async fn create_get_delete_roundtrip() {
    let state = test_state();
    let info = state
        .create_agent_from_config(inline_config("helper"))
        .await
        .expect("create");
    assert_eq!(info.status, AgentStatus::Running);

    let fetched = state.get_agent(&info.id).await.expect("get");
    assert_eq!(fetched.name, "helper");

    // running without force fails, force succeeds
    let err = state.delete_agent(&info.id, false).await.expect_err("running");
    assert_eq!(err.code, RpcCode::FailedPrecondition);
    state.delete_agent(&info.id, true).await.expect("force delete");

    let err = state.get_agent(&info.id).await.expect_err("gone");
    assert_eq!(err.code, RpcCode::NotFound);
}

#[tokio::test]
async fn start_and_stop_are_idempotent() {
    let state = test_state();
    let info = state
        .create_agent_from_config(inline_config("helper"))
        .await
        .expect("create");

    let stopped = state.stop_agent(&info.id).await.expect("stop");
    assert_eq!(stopped.status, AgentStatus::Stopped);
    let stopped = state.stop_agent(&info.id).await.expect("stop again");
    assert_eq!(stopped.status, AgentStatus::Stopped);

    let started = state.start_agent(&info.id).await.expect("start");
    assert_eq!(started.status, AgentStatus::Running);
    let started = state.start_agent(&info.id).await.expect("start again");
    assert_eq!(started.status, AgentStatus::Running);

    // stopped delete needs no force
    state.stop_agent(&info.id).await.expect("stop");
    state.delete_agent(&info.id, false).await.expect("delete");
}

#[tokio::test]
async fn reload_requires_exactly_one_mode_and_swaps_config() {
    let state = test_state();
    let info = state
        .create_agent_from_config(inline_config("helper"))
        .await
        .expect("create");

    let err = state
        .reload_agent(&info.id, ReloadAgentRequest::default())
        .await
        .expect_err("neither mode");
    assert_eq!(err.code, RpcCode::InvalidArgument);

    // from-file without an external registry is a precondition failure
    let err = state
        .reload_agent(
            &info.id,
            ReloadAgentRequest {
                config: None,
                reload_from_file: true,
            },
        )
        .await
        .expect_err("no registry");
    assert_eq!(err.code, RpcCode::FailedPrecondition);

    let mut config = AgentConfig::new("helper-v2");
    config.system_prompt = "be terse".to_string();
    let reloaded = state
        .reload_agent(
            &info.id,
            ReloadAgentRequest {
                config: Some(config),
                reload_from_file: false,
            },
        )
        .await
        .expect("reload");
    assert_eq!(reloaded.id, info.id);
    assert_eq!(reloaded.name, "helper-v2");
    assert_eq!(reloaded.status, AgentStatus::Running);
}

// --- weave and session routing ---

#[tokio::test]
async fn weave_rejects_empty_query_and_generates_session_ids() {
    let state = test_state();
    state
        .create_agent_from_config(inline_config("default"))
        .await
        .expect("create");

    let err = run_weave(
        &state,
        WeaveRequest {
            query: "   ".to_string(),
            ..Default::default()
        },
    )
    .await
    .expect_err("empty query");
    assert_eq!(err.code, RpcCode::InvalidArgument);

    let response = run_weave(
        &state,
        WeaveRequest {
            query: "hello".to_string(),
            ..Default::default()
        },
    )
    .await
    .expect("weave");
    assert!(response.session_id.starts_with("sess_"));
    assert_eq!(response.session_id.len(), "sess_".len() + 8);
    assert_eq!(response.text, "echo: hello");
    assert_eq!(response.cost.provider, "scripted");
}

#[tokio::test]
async fn session_routes_back_to_owner_not_default() {
    let state = test_state();
    let a = state
        .create_agent_from_config(inline_config("agent-a"))
        .await
        .expect("create a");
    let b = state
        .create_agent_from_config(inline_config("agent-b"))
        .await
        .expect("create b");
    // first created agent is the default
    assert_eq!(state.default_agent_id().await.as_deref(), Some(a.id.as_str()));

    let first = run_weave(
        &state,
        WeaveRequest {
            query: "start".to_string(),
            session_id: None,
            agent_id: Some(b.id.clone()),
        },
    )
    .await
    .expect("first turn");
    assert_eq!(first.agent_id, b.id);

    // same session, no explicit agent: must stay on b, not fall to default a
    let second = run_weave(
        &state,
        WeaveRequest {
            query: "again".to_string(),
            session_id: Some(first.session_id.clone()),
            agent_id: None,
        },
    )
    .await
    .expect("second turn");
    assert_eq!(second.agent_id, b.id);
    assert_eq!(second.session_id, first.session_id);
}

#[tokio::test]
async fn unknown_explicit_agent_is_not_found() {
    let state = test_state();
    state
        .create_agent_from_config(inline_config("default"))
        .await
        .expect("create");
    let err = run_weave(
        &state,
        WeaveRequest {
            query: "hi".to_string(),
            session_id: None,
            agent_id: Some("nope".to_string()),
        },
    )
    .await
    .expect_err("unknown agent");
    assert_eq!(err.code, RpcCode::NotFound);
}

// --- streaming drain ---

async fn collect_frames(
    stream: impl futures::Stream<Item = Result<actix_web::web::Bytes, actix_web::Error>>,
) -> Vec<serde_json::Value> {
    let chunks: Vec<_> = stream.collect().await;
    chunks
        .into_iter()
        .filter_map(|chunk| chunk.ok())
        .filter_map(|bytes| {
            let text = String::from_utf8(bytes.to_vec()).ok()?;
            let payload = text.strip_prefix("data: ")?.trim().to_string();
            serde_json::from_str(&payload).ok()
        })
        .collect()
}

#[tokio::test]
async fn stream_drain_ends_with_completed_frame() {
    let provider = ScriptedProvider::new();
    provider.push_text("streamed answer");
    let agent: Arc<dyn Agent> = Arc::new(LlmAgent::new("streamer", Arc::new(provider)));

    let cancel = CancellationToken::new();
    let (progress_tx, progress_rx) = mpsc::channel(10);
    let (result_tx, result_rx) = mpsc::channel(1);
    let sink = ProgressSink::new(progress_tx, cancel.clone());
    let worker = agent.clone();
    tokio::spawn(async move {
        let outcome = worker.chat_with_progress("sess_11112222", "q", sink).await;
        let _ = result_tx.try_send(outcome);
    });

    let frames = collect_frames(crate::handlers::stream::drain_stream(
        "sess_11112222".to_string(),
        "agent-1".to_string(),
        progress_rx,
        result_rx,
        cancel,
    ))
    .await;

    assert!(frames.len() >= 3);
    let last = frames.last().expect("last frame");
    assert_eq!(last["stage"], "completed");
    assert_eq!(last["progress"], 100);
    assert_eq!(last["message"], "Query completed successfully");
    assert_eq!(last["partial_result"]["type"], "text");
    assert_eq!(last["partial_result"]["data_json"], "streamed answer");

    // progress is monotonically non-decreasing when no failure frame appears
    let mut previous = 0u64;
    for frame in &frames {
        let progress = frame["progress"].as_u64().expect("progress");
        assert!(progress >= previous);
        previous = progress;
    }
}

#[tokio::test]
async fn stream_drain_reports_failure_with_zero_progress() {
    let provider = ScriptedProvider::new();
    provider.push_error("model unavailable");
    let agent: Arc<dyn Agent> = Arc::new(LlmAgent::new("streamer", Arc::new(provider)));

    let cancel = CancellationToken::new();
    let (progress_tx, progress_rx) = mpsc::channel(10);
    let (result_tx, result_rx) = mpsc::channel(1);
    let sink = ProgressSink::new(progress_tx, cancel.clone());
    let worker = agent.clone();
    tokio::spawn(async move {
        let outcome = worker.chat_with_progress("sess_33334444", "q", sink).await;
        let _ = result_tx.try_send(outcome);
    });

    let frames = collect_frames(crate::handlers::stream::drain_stream(
        "sess_33334444".to_string(),
        "agent-1".to_string(),
        progress_rx,
        result_rx,
        cancel,
    ))
    .await;

    let last = frames.last().expect("last frame");
    assert_eq!(last["stage"], "failed");
    assert_eq!(last["progress"], 0);
    assert!(last["message"]
        .as_str()
        .expect("message")
        .contains("model unavailable"));
}

// --- HITL ---

#[tokio::test]
async fn permission_times_out_and_cleans_up() {
    let state = test_state();
    let started = Instant::now();
    let decision = state
        .request_tool_permission(
            PermissionRequest {
                session_id: "sess_aaaa0001".to_string(),
                tool_name: "run_sql".to_string(),
                args_json: String::new(),
                description: String::new(),
                risk_level: "low".to_string(),
                timeout_seconds: 1,
            },
            CancellationToken::new(),
        )
        .await
        .expect("timeout decision");
    let elapsed = started.elapsed();

    assert!(!decision.granted);
    assert!(decision.timed_out);
    assert!(decision.message.contains("timed out after 1 seconds"));
    assert!(elapsed >= Duration::from_millis(900));
    assert!(elapsed < Duration::from_secs(3));
    assert!(state.pending_permission_ids().is_empty());
}

#[tokio::test]
async fn permission_grant_delivers_exactly_once() {
    let state = test_state();

    let waiter_state = state.clone();
    let waiter = tokio::spawn(async move {
        waiter_state
            .request_tool_permission(
                PermissionRequest {
                    session_id: "sess_bbbb0002".to_string(),
                    tool_name: "write_file".to_string(),
                    args_json: "{}".to_string(),
                    description: "write output".to_string(),
                    risk_level: "high".to_string(),
                    timeout_seconds: 5,
                },
                CancellationToken::new(),
            )
            .await
    });

    wait_for(|| !state.pending_permission_ids().is_empty()).await;
    let perm_id = state.pending_permission_ids().remove(0);
    assert!(perm_id.starts_with("perm-sess_bbbb0002-write_file-"));

    state
        .grant_tool_permission(&perm_id, true, "approved", true)
        .expect("grant");

    let decision = waiter.await.expect("join").expect("decision");
    assert!(decision.granted);
    assert_eq!(decision.message, "approved");
    assert!(decision.remember_decision);
    assert!(!decision.timed_out);

    // second answer finds nothing
    let err = state
        .grant_tool_permission(&perm_id, false, "late", false)
        .expect_err("already answered");
    assert_eq!(err.code, RpcCode::NotFound);
    assert!(err.message.contains("not found or already answered"));
}

#[tokio::test]
async fn permission_cancellation_cleans_up() {
    let state = test_state();
    let cancel = CancellationToken::new();

    let waiter_state = state.clone();
    let waiter_cancel = cancel.clone();
    let waiter = tokio::spawn(async move {
        waiter_state
            .request_tool_permission(
                PermissionRequest {
                    session_id: "sess_cccc0003".to_string(),
                    tool_name: "run_sql".to_string(),
                    args_json: String::new(),
                    description: String::new(),
                    risk_level: String::new(),
                    timeout_seconds: 30,
                },
                waiter_cancel,
            )
            .await
    });

    wait_for(|| !state.pending_permission_ids().is_empty()).await;
    cancel.cancel();

    let err = waiter.await.expect("join").expect_err("cancelled");
    assert_eq!(err.code, RpcCode::Cancelled);
    wait_for(|| state.pending_permission_ids().is_empty()).await;
}

#[tokio::test]
async fn clarification_roundtrip() {
    let state = test_state();

    let err = state
        .request_clarification(
            ClarificationRequest {
                session_id: String::new(),
                question: "which table?".to_string(),
                description: String::new(),
                risk_level: String::new(),
                timeout_seconds: 1,
            },
            CancellationToken::new(),
        )
        .await
        .expect_err("missing session");
    assert_eq!(err.code, RpcCode::InvalidArgument);

    let waiter_state = state.clone();
    let waiter = tokio::spawn(async move {
        waiter_state
            .request_clarification(
                ClarificationRequest {
                    session_id: "sess_dddd0004".to_string(),
                    question: "which table?".to_string(),
                    description: String::new(),
                    risk_level: String::new(),
                    timeout_seconds: 5,
                },
                CancellationToken::new(),
            )
            .await
    });

    wait_for(|| !state.pending_clarification_ids().is_empty()).await;
    let question_id = state.pending_clarification_ids().remove(0);
    state
        .answer_clarification(&question_id, "orders")
        .expect("answer");

    let decision = waiter.await.expect("join").expect("decision");
    assert_eq!(decision.answer, "orders");
    assert!(!decision.timed_out);

    let err = state
        .answer_clarification(&question_id, "late")
        .expect_err("second answer");
    assert_eq!(err.code, RpcCode::NotFound);
}

// --- judges through the server registry ---

#[tokio::test]
async fn judge_weighted_average_scenario() {
    let state = test_state();
    let provider = ScriptedProvider::new();
    provider.push_text(r#"{"overall_score": 90, "verdict": "PASS"}"#);
    provider.push_text(r#"{"overall_score": 70, "verdict": "PASS"}"#);
    provider.push_text(r#"{"overall_score": 90, "verdict": "PASS"}"#);
    provider.push_text(r#"{"overall_score": 60, "verdict": "FAIL"}"#);
    state.judges().set_default_provider(Arc::new(provider)).await;

    for name in ["First", "Second"] {
        state
            .judges()
            .register_judge(Some(JudgeConfig {
                id: String::new(),
                name: name.to_string(),
                criteria: "quality".to_string(),
                weight: None,
                pass_threshold: None,
            }))
            .await
            .expect("register");
    }
    let ids = vec!["first".to_string(), "second".to_string()];

    let result = state
        .judges()
        .evaluate_with_judges(
            &ids,
            &EvaluationContext::default(),
            AggregationStrategy::WeightedAverage,
        )
        .await
        .expect("evaluate");
    assert_eq!(result.final_score, 80.0);
    assert!(result.passed);

    let result = state
        .judges()
        .evaluate_with_judges(
            &ids,
            &EvaluationContext::default(),
            AggregationStrategy::WeightedAverage,
        )
        .await
        .expect("evaluate");
    assert_eq!(result.final_score, 75.0);
    assert!(!result.passed);
}

// --- traces ---

fn test_span(trace_id: &str, span_id: &str, parent: Option<&str>, duration_us: i64) -> Span {
    let now = chrono::Utc::now();
    Span {
        trace_id: trace_id.to_string(),
        span_id: span_id.to_string(),
        parent_id: parent.map(str::to_string),
        name: span_id.to_string(),
        start_time: now,
        end_time: now,
        duration_us,
        status: SpanStatus {
            code: SpanStatusCode::Ok,
            message: String::new(),
        },
        attributes: Default::default(),
        events: Vec::new(),
    }
}

#[tokio::test]
async fn trace_lookup_checks_preconditions_then_returns_view() {
    let state = test_state();

    let err = state.get_trace_view("").await.expect_err("empty id");
    assert_eq!(err.code, RpcCode::InvalidArgument);

    // store exists from construction but no tracer is wired yet
    let err = state.get_trace_view("t1").await.expect_err("no tracer");
    assert_eq!(err.code, RpcCode::FailedPrecondition);

    let store = state.trace_store().await.expect("store");
    state.set_tracer(Arc::new(Tracer::new(store.clone()))).await;

    let err = state.get_trace_view("t1").await.expect_err("absent trace");
    assert_eq!(err.code, RpcCode::NotFound);

    store.add_span(test_span("t1", "root", None, 5_000));
    store.add_span(test_span("t1", "child", Some("root"), 2_000));

    let view = state.get_trace_view("t1").await.expect("view");
    assert_eq!(view.spans.len(), 2);
    assert_eq!(view.root_span.expect("root").span_id, "root");
    assert_eq!(view.total_duration_ms, 7);
    assert!(view.spans.iter().all(|s| s.status == "ok"));
}

#[tokio::test]
async fn trace_eviction_is_observable_through_lookup() {
    let store = Arc::new(TraceStore::new());
    store.add_span(test_span("t1", "root", None, 1_000));
    assert_eq!(store.evict_expired(chrono::Duration::zero()), 1);
    assert!(store.get_trace("t1").is_none());
}

// --- admin auth ---

#[tokio::test]
async fn admin_token_gate() {
    let state = Arc::new(ServerState::new(
        Arc::new(ScriptedProvider::new()),
        ServerConfig {
            admin_token: "secret".to_string(),
            ..ServerConfig::default()
        },
    ));

    let no_header = actix_web::test::TestRequest::default().to_http_request();
    let err = crate::handlers::admin::require_admin(&no_header, &state).expect_err("no token");
    assert_eq!(err.code, RpcCode::PermissionDenied);

    let wrong = actix_web::test::TestRequest::default()
        .insert_header(("x-admin-token", "nope"))
        .to_http_request();
    let err = crate::handlers::admin::require_admin(&wrong, &state).expect_err("wrong token");
    assert_eq!(err.code, RpcCode::PermissionDenied);

    let good = actix_web::test::TestRequest::default()
        .insert_header(("x-admin-token", "secret"))
        .to_http_request();
    crate::handlers::admin::require_admin(&good, &state).expect("accepted");

    // empty configured token disables the check
    let open = test_state();
    let bare = actix_web::test::TestRequest::default().to_http_request();
    crate::handlers::admin::require_admin(&bare, &open).expect("open server");
}

// --- shutdown ---

#[tokio::test]
async fn shutdown_stops_reloaders_and_mcp_servers() {
    use std::io::Write;
    use weave_mcp::{McpClient, McpManager, McpServerConfig, ScriptedClient, TransportConfig};

    let state = test_state();
    let a = state
        .create_agent_from_config(inline_config("agent-a"))
        .await
        .expect("create");

    let dir = tempfile::tempdir().expect("temp dir");
    let mut file = std::fs::File::create(dir.path().join("top-n.yaml")).expect("create");
    writeln!(file, "name: top-n\ndomain: sql").expect("write");
    state
        .load_patterns(crate::patterns::LoadPatternsRequest {
            source: dir.path().display().to_string(),
            agent_id: Some(a.id.clone()),
            watch: true,
        })
        .await
        .expect("load");

    let manager = Arc::new(McpManager::new(Box::new(|_: &McpServerConfig| {
        Ok(Box::new(ScriptedClient::with_tool_names(&["query"])) as Box<dyn McpClient>)
    })));
    manager
        .add_server(McpServerConfig {
            name: "files".to_string(),
            enabled: true,
            transport: TransportConfig::Sse {
                url: "http://localhost:9000".to_string(),
            },
            request_timeout_ms: 1000,
            healthcheck_interval_ms: 0,
        })
        .await
        .expect("add server");
    state.set_mcp_manager(manager.clone()).await;

    state.shutdown().await;

    assert!(!manager.is_server_running("files"));
    let core = state.core.read().await;
    assert!(core.hot_reloaders.is_empty());
}

// --- patterns ---

#[tokio::test]
async fn load_patterns_collects_per_agent_errors() {
    use std::io::Write;

    let state = test_state();
    let a = state
        .create_agent_from_config(inline_config("agent-a"))
        .await
        .expect("create");

    let dir = tempfile::tempdir().expect("temp dir");
    let mut file = std::fs::File::create(dir.path().join("top-n.yaml")).expect("create");
    writeln!(file, "name: top-n\ndomain: sql\ncategory: analytics").expect("write");

    let response = state
        .load_patterns(crate::patterns::LoadPatternsRequest {
            source: dir.path().display().to_string(),
            agent_id: None,
            watch: false,
        })
        .await
        .expect("load");
    assert_eq!(response.loaded.get(&a.id), Some(&1));
    assert!(response.errors.is_empty());

    let patterns = state.list_patterns(Some(&a.id)).await.expect("list");
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].backend_type, "sql");

    let err = state
        .get_pattern("missing", Some(&a.id))
        .await
        .expect_err("unknown pattern");
    assert_eq!(err.code, RpcCode::NotFound);

    // a source nobody can read fails the whole call
    let err = state
        .load_patterns(crate::patterns::LoadPatternsRequest {
            source: "/nonexistent/patterns".to_string(),
            agent_id: None,
            watch: false,
        })
        .await
        .expect_err("all agents failed");
    assert_eq!(err.code, RpcCode::Internal);
}
