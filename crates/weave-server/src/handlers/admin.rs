use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse, Responder};

use weave_core::{Agent, ServiceError};

use crate::handlers::error_response;
use crate::state::ServerState;

/// Admin gate: a configured token must match `x-admin-token` exactly. An
/// empty configured token disables the check.
pub fn require_admin(req: &HttpRequest, state: &ServerState) -> Result<(), ServiceError> {
    let expected = &state.config().admin_token;
    if expected.is_empty() {
        return Ok(());
    }
    let presented = req
        .headers()
        .get("x-admin-token")
        .and_then(|h| h.to_str().ok());
    match presented {
        Some(token) if token == expected => Ok(()),
        _ => Err(ServiceError::permission_denied("admin token required")),
    }
}

/// Every session across every agent.
pub async fn list_all_sessions(
    state: web::Data<Arc<ServerState>>,
    req: HttpRequest,
) -> impl Responder {
    if let Err(e) = require_admin(&req, state.get_ref()) {
        return error_response(&e);
    }

    let mut sessions = Vec::new();
    for info in state.list_agents().await {
        if let Some(agent) = state.agent(&info.id).await {
            for session_id in agent.session_ids().await {
                let detail = agent.session(&session_id).await;
                sessions.push(serde_json::json!({
                    "agent_id": info.id,
                    "agent_name": info.name,
                    "session_id": session_id,
                    "message_count": detail.as_ref().map(|s| s.message_count()).unwrap_or(0),
                    "total_cost_usd": detail.as_ref().map(|s| s.total_cost_usd).unwrap_or(0.0),
                }));
            }
        }
    }
    HttpResponse::Ok().json(serde_json::json!({ "sessions": sessions }))
}

pub async fn list_all_agents(
    state: web::Data<Arc<ServerState>>,
    req: HttpRequest,
) -> impl Responder {
    if let Err(e) = require_admin(&req, state.get_ref()) {
        return error_response(&e);
    }
    let agents = state.list_agents().await;
    HttpResponse::Ok().json(serde_json::json!({
        "agents": agents,
        "pending_permissions": state.pending_permission_ids().len(),
        "pending_clarifications": state.pending_clarification_ids().len(),
    }))
}
