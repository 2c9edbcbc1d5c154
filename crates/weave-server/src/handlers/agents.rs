use std::sync::Arc;

use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;

use crate::handlers::error_response;
use crate::lifecycle::{CreateAgentRequest, ReloadAgentRequest};
use crate::state::ServerState;

pub async fn create(
    state: web::Data<Arc<ServerState>>,
    req: web::Json<CreateAgentRequest>,
) -> impl Responder {
    match state.create_agent_from_config(req.into_inner()).await {
        Ok(info) => HttpResponse::Ok().json(info),
        Err(e) => error_response(&e),
    }
}

pub async fn list(state: web::Data<Arc<ServerState>>) -> impl Responder {
    let agents = state.list_agents().await;
    HttpResponse::Ok().json(serde_json::json!({ "agents": agents }))
}

pub async fn get(
    state: web::Data<Arc<ServerState>>,
    path: web::Path<String>,
) -> impl Responder {
    match state.get_agent(&path.into_inner()).await {
        Ok(info) => HttpResponse::Ok().json(info),
        Err(e) => error_response(&e),
    }
}

pub async fn start(
    state: web::Data<Arc<ServerState>>,
    path: web::Path<String>,
) -> impl Responder {
    match state.start_agent(&path.into_inner()).await {
        Ok(info) => HttpResponse::Ok().json(info),
        Err(e) => error_response(&e),
    }
}

pub async fn stop(
    state: web::Data<Arc<ServerState>>,
    path: web::Path<String>,
) -> impl Responder {
    match state.stop_agent(&path.into_inner()).await {
        Ok(info) => HttpResponse::Ok().json(info),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteAgentQuery {
    #[serde(default)]
    pub force: bool,
}

pub async fn delete(
    state: web::Data<Arc<ServerState>>,
    path: web::Path<String>,
    query: web::Query<DeleteAgentQuery>,
) -> impl Responder {
    let agent_id = path.into_inner();
    match state.delete_agent(&agent_id, query.force).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "deleted": agent_id })),
        Err(e) => error_response(&e),
    }
}

pub async fn reload(
    state: web::Data<Arc<ServerState>>,
    path: web::Path<String>,
    req: web::Json<ReloadAgentRequest>,
) -> impl Responder {
    match state.reload_agent(&path.into_inner(), req.into_inner()).await {
        Ok(info) => HttpResponse::Ok().json(info),
        Err(e) => error_response(&e),
    }
}
