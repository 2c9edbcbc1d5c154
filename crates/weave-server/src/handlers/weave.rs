use std::sync::Arc;

use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};

use weave_core::agent::UsageReport;
use weave_core::{new_session_id, Agent, AgentError, ServiceError};

use crate::handlers::error_response;
use crate::state::ServerState;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WeaveRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WeaveResponse {
    pub text: String,
    pub session_id: String,
    pub agent_id: String,
    pub cost: UsageReport,
}

/// Single conversational turn.
pub async fn handler(
    state: web::Data<Arc<ServerState>>,
    req: web::Json<WeaveRequest>,
) -> impl Responder {
    match run_weave(state.get_ref(), req.into_inner()).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => error_response(&e),
    }
}

pub(crate) async fn run_weave(
    state: &Arc<ServerState>,
    req: WeaveRequest,
) -> Result<WeaveResponse, ServiceError> {
    if req.query.trim().is_empty() {
        return Err(ServiceError::invalid_argument("query must not be empty"));
    }
    let session_id = req
        .session_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(new_session_id);

    let (agent_id, agent) = state
        .resolve_agent(req.agent_id.as_deref(), &session_id)
        .await?;

    log::info!("[{}] weave via agent {}", session_id, agent_id);
    let reply = agent.chat(&session_id, &req.query).await.map_err(|e| {
        log::error!("[{}] agent error: {}", session_id, e);
        match e {
            AgentError::Cancelled => ServiceError::cancelled("request cancelled"),
            other => ServiceError::internal(other.to_string()),
        }
    })?;

    Ok(WeaveResponse {
        text: reply.content,
        session_id,
        agent_id,
        cost: reply.usage,
    })
}
