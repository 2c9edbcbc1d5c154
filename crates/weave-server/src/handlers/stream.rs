use std::sync::Arc;

use actix_web::http::header;
use actix_web::{web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use weave_core::{
    new_session_id, Agent, AgentError, AgentReply, HitlRequest, ProgressEvent, ProgressSink,
};

use crate::handlers::error_response;
use crate::handlers::weave::WeaveRequest;
use crate::state::ServerState;

/// Wire shape of one streamed frame.
#[derive(Debug, Serialize)]
pub struct ProgressFrame {
    pub session_id: String,
    pub agent_id: String,
    pub stage: String,
    pub progress: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_content: Option<String>,
    pub is_token_stream: bool,
    pub token_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttft_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hitl_request: Option<HitlRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_result: Option<PartialResult>,
}

#[derive(Debug, Serialize)]
pub struct PartialResult {
    #[serde(rename = "type")]
    pub result_type: String,
    pub data_json: String,
}

fn progress_frame(session_id: &str, agent_id: &str, event: ProgressEvent) -> ProgressFrame {
    ProgressFrame {
        session_id: session_id.to_string(),
        agent_id: agent_id.to_string(),
        stage: event.stage.to_string(),
        progress: event.progress,
        message: event.message,
        tool_name: event.tool_name,
        timestamp: event.timestamp,
        partial_content: event.partial_content,
        is_token_stream: event.is_token_stream,
        token_count: event.token_count,
        ttft_ms: event.ttft_ms,
        hitl_request: event.hitl_request,
        partial_result: None,
    }
}

fn completed_frame(session_id: &str, agent_id: &str, content: String) -> ProgressFrame {
    ProgressFrame {
        session_id: session_id.to_string(),
        agent_id: agent_id.to_string(),
        stage: "completed".to_string(),
        progress: 100,
        message: "Query completed successfully".to_string(),
        tool_name: None,
        timestamp: Utc::now(),
        partial_content: None,
        is_token_stream: false,
        token_count: 0,
        ttft_ms: None,
        hitl_request: None,
        partial_result: Some(PartialResult {
            result_type: "text".to_string(),
            data_json: content,
        }),
    }
}

fn failed_frame(session_id: &str, agent_id: &str, message: String) -> ProgressFrame {
    ProgressFrame {
        session_id: session_id.to_string(),
        agent_id: agent_id.to_string(),
        stage: "failed".to_string(),
        progress: 0,
        message,
        tool_name: None,
        timestamp: Utc::now(),
        partial_content: None,
        is_token_stream: false,
        token_count: 0,
        ttft_ms: None,
        hitl_request: None,
        partial_result: None,
    }
}

fn sse_bytes(frame: &ProgressFrame) -> web::Bytes {
    let payload = serde_json::to_string(frame).unwrap_or_else(|_| "{}".to_string());
    web::Bytes::from(format!("data: {}\n\n", payload))
}

/// Server-streaming variant of weave. One worker drives the agent; the
/// response body drains the progress channel and closes with a synthesized
/// completion frame.
pub async fn handler(
    state: web::Data<Arc<ServerState>>,
    req: web::Json<WeaveRequest>,
) -> impl Responder {
    let req = req.into_inner();
    if req.query.trim().is_empty() {
        return error_response(&weave_core::ServiceError::invalid_argument(
            "query must not be empty",
        ));
    }
    let session_id = req
        .session_id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(new_session_id);

    let (agent_id, agent) = match state
        .resolve_agent(req.agent_id.as_deref(), &session_id)
        .await
    {
        Ok(resolved) => resolved,
        Err(e) => return error_response(&e),
    };
    log::info!("[{}] stream weave via agent {}", session_id, agent_id);

    let cancel = CancellationToken::new();
    let (progress_tx, progress_rx) =
        mpsc::channel::<ProgressEvent>(state.config().progress_capacity);
    let (result_tx, result_rx) = mpsc::channel::<Result<AgentReply, AgentError>>(1);
    let sink = ProgressSink::new(progress_tx, cancel.clone());

    // Exactly one worker per stream. The sink is dropped with the worker,
    // which closes the progress channel and lets the drain loop finish.
    let worker_agent = agent;
    let worker_session = session_id.clone();
    let worker_query = req.query.clone();
    tokio::spawn(async move {
        let outcome = worker_agent
            .chat_with_progress(&worker_session, &worker_query, sink)
            .await;
        let _ = result_tx.try_send(outcome);
    });

    HttpResponse::Ok()
        .append_header((header::CONTENT_TYPE, "text/event-stream"))
        .append_header((header::CACHE_CONTROL, "no-cache"))
        .append_header((header::CONNECTION, "keep-alive"))
        .streaming(drain_stream(session_id, agent_id, progress_rx, result_rx, cancel))
}

/// The drain loop: forward progress frames in order, remember the worker
/// outcome, and exit only once the progress channel is closed AND the
/// outcome is recorded, so no trailing frames are lost. Dropping the stream
/// (client disconnect) cancels the worker through the token guard.
pub(crate) fn drain_stream(
    session_id: String,
    agent_id: String,
    mut progress_rx: mpsc::Receiver<ProgressEvent>,
    mut result_rx: mpsc::Receiver<Result<AgentReply, AgentError>>,
    cancel: CancellationToken,
) -> impl futures::Stream<Item = Result<web::Bytes, actix_web::Error>> {
    async_stream::stream! {
        let _guard = cancel.drop_guard();
        let mut progress_closed = false;
        let mut result: Option<Result<AgentReply, AgentError>> = None;

        while !(progress_closed && result.is_some()) {
            let next_event = tokio::select! {
                maybe_event = progress_rx.recv(), if !progress_closed => {
                    match maybe_event {
                        Some(event) => Some(event),
                        None => {
                            progress_closed = true;
                            None
                        }
                    }
                }
                maybe_result = result_rx.recv(), if result.is_none() => {
                    result = Some(maybe_result.unwrap_or_else(|| {
                        Err(AgentError::Llm("worker exited without a result".to_string()))
                    }));
                    None
                }
            };
            if let Some(event) = next_event {
                yield Ok(sse_bytes(&progress_frame(&session_id, &agent_id, event)));
            }
        }

        match result {
            Some(Ok(reply)) => {
                yield Ok(sse_bytes(&completed_frame(&session_id, &agent_id, reply.content)));
            }
            Some(Err(e)) => {
                log::error!("[{}] stream weave failed: {}", session_id, e);
                yield Ok(sse_bytes(&failed_frame(&session_id, &agent_id, e.to_string())));
            }
            None => {}
        }
    }
}
