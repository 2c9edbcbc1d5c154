use std::sync::Arc;

use actix_web::{web, HttpResponse, Responder};

use weave_core::StorageBackend;

use crate::state::ServerState;

/// Liveness plus a storage probe when a backend is wired.
pub async fn handler(state: web::Data<Arc<ServerState>>) -> impl Responder {
    let storage = match state.storage_backend().await {
        Some(backend) => {
            let healthy = backend.ping().await.is_ok();
            let details = backend.storage_details().await.ok().flatten();
            serde_json::json!({
                "configured": true,
                "backend_type": backend.backend_type(),
                "healthy": healthy,
                "version": details.as_ref().map(|d| d.version.clone()),
                "pool_stats": details.as_ref().map(|d| d.pool_stats.clone()),
            })
        }
        None => serde_json::json!({ "configured": false }),
    };

    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "agents": state.list_agents().await.len(),
        "storage": storage,
    }))
}
