use std::sync::Arc;

use actix_web::{web, HttpResponse, Responder};

use crate::handlers::error_response;
use crate::state::ServerState;

pub async fn get(
    state: web::Data<Arc<ServerState>>,
    path: web::Path<String>,
) -> impl Responder {
    match state.get_trace_view(&path.into_inner()).await {
        Ok(view) => HttpResponse::Ok().json(view),
        Err(e) => error_response(&e),
    }
}
