use std::sync::Arc;

use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;

use crate::handlers::error_response;
use crate::patterns::LoadPatternsRequest;
use crate::state::ServerState;

#[derive(Debug, Default, Deserialize)]
pub struct PatternQuery {
    #[serde(default)]
    pub agent_id: Option<String>,
}

pub async fn list(
    state: web::Data<Arc<ServerState>>,
    query: web::Query<PatternQuery>,
) -> impl Responder {
    match state.list_patterns(query.agent_id.as_deref()).await {
        Ok(patterns) => HttpResponse::Ok().json(serde_json::json!({ "patterns": patterns })),
        Err(e) => error_response(&e),
    }
}

pub async fn get(
    state: web::Data<Arc<ServerState>>,
    path: web::Path<String>,
    query: web::Query<PatternQuery>,
) -> impl Responder {
    match state
        .get_pattern(&path.into_inner(), query.agent_id.as_deref())
        .await
    {
        Ok(pattern) => HttpResponse::Ok().json(pattern),
        Err(e) => error_response(&e),
    }
}

pub async fn load(
    state: web::Data<Arc<ServerState>>,
    req: web::Json<LoadPatternsRequest>,
) -> impl Responder {
    match state.load_patterns(req.into_inner()).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => error_response(&e),
    }
}
