use std::sync::Arc;

use actix_web::http::header;
use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use tokio::sync::mpsc;

use weave_judge::{AggregationStrategy, EvaluationContext, EvaluationEvent, JudgeConfig};

use crate::handlers::error_response;
use crate::state::ServerState;

pub async fn register(
    state: web::Data<Arc<ServerState>>,
    req: web::Json<JudgeConfig>,
) -> impl Responder {
    match state.judges().register_judge(Some(req.into_inner())).await {
        Ok(config) => HttpResponse::Ok().json(config),
        Err(e) => error_response(&e),
    }
}

pub async fn list(state: web::Data<Arc<ServerState>>) -> impl Responder {
    let judges = state.judges().list_judges().await;
    HttpResponse::Ok().json(serde_json::json!({ "judges": judges }))
}

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub judge_ids: Vec<String>,
    pub context: EvaluationContext,
    #[serde(default)]
    pub aggregation: AggregationStrategy,
}

pub async fn evaluate(
    state: web::Data<Arc<ServerState>>,
    req: web::Json<EvaluateRequest>,
) -> impl Responder {
    let req = req.into_inner();
    match state
        .judges()
        .evaluate_with_judges(&req.judge_ids, &req.context, req.aggregation)
        .await
    {
        Ok(result) => HttpResponse::Ok().json(result),
        Err(e) => error_response(&e),
    }
}

/// SSE evaluation: JudgeStarted/JudgeCompleted per judge, then a single
/// EvaluationCompleted frame.
pub async fn evaluate_stream(
    state: web::Data<Arc<ServerState>>,
    req: web::Json<EvaluateRequest>,
) -> impl Responder {
    let req = req.into_inner();
    if req.judge_ids.is_empty() {
        return error_response(&weave_core::ServiceError::invalid_argument(
            "at least one judge id is required",
        ));
    }

    let (event_tx, mut event_rx) = mpsc::channel::<EvaluationEvent>(16);
    let state = state.get_ref().clone();
    tokio::spawn(async move {
        if let Err(e) = state
            .judges()
            .evaluate_streaming(&req.judge_ids, &req.context, req.aggregation, event_tx)
            .await
        {
            // the stream ends without a completion frame; the unary
            // endpoint reports the same failure with a status code
            log::error!("streaming evaluation failed: {}", e);
        }
    });

    HttpResponse::Ok()
        .append_header((header::CONTENT_TYPE, "text/event-stream"))
        .append_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(async_stream::stream! {
            while let Some(event) = event_rx.recv().await {
                let payload = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
                let done = matches!(event, EvaluationEvent::EvaluationCompleted { .. });
                yield Ok::<_, actix_web::Error>(web::Bytes::from(format!("data: {}\n\n", payload)));
                if done {
                    break;
                }
            }
        })
}
