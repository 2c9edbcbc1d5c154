use std::sync::Arc;

use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::handlers::error_response;
use crate::hitl::{ClarificationRequest, PermissionRequest};
use crate::state::ServerState;

/// Blocking side of the permission rendezvous. If the client disconnects
/// the dropped future removes the pending entry.
pub async fn request_permission(
    state: web::Data<Arc<ServerState>>,
    req: web::Json<PermissionRequest>,
) -> impl Responder {
    let cancel = CancellationToken::new();
    match state
        .request_tool_permission(req.into_inner(), cancel)
        .await
    {
        Ok(decision) => HttpResponse::Ok().json(decision),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct GrantPermissionRequest {
    pub granted: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub remember_decision: bool,
}

pub async fn grant_permission(
    state: web::Data<Arc<ServerState>>,
    path: web::Path<String>,
    req: web::Json<GrantPermissionRequest>,
) -> impl Responder {
    let perm_id = path.into_inner();
    match state.grant_tool_permission(
        &perm_id,
        req.granted,
        req.message.clone(),
        req.remember_decision,
    ) {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "answered": perm_id })),
        Err(e) => error_response(&e),
    }
}

pub async fn request_clarification(
    state: web::Data<Arc<ServerState>>,
    req: web::Json<ClarificationRequest>,
) -> impl Responder {
    let cancel = CancellationToken::new();
    match state.request_clarification(req.into_inner(), cancel).await {
        Ok(decision) => HttpResponse::Ok().json(decision),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct AnswerClarificationRequest {
    pub answer: String,
}

pub async fn answer_clarification(
    state: web::Data<Arc<ServerState>>,
    path: web::Path<String>,
    req: web::Json<AnswerClarificationRequest>,
) -> impl Responder {
    let question_id = path.into_inner();
    match state.answer_clarification(&question_id, req.answer.clone()) {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "answered": question_id })),
        Err(e) => error_response(&e),
    }
}
