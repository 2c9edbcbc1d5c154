use std::sync::Arc;

use actix_web::{web, HttpResponse, Responder};
use tokio::time::Duration;

use weave_core::ServiceError;
use weave_mcp::{McpError, McpManager, McpServerConfig};

use crate::handlers::error_response;
use crate::state::ServerState;

const REINDEX_BUDGET: Duration = Duration::from_secs(10);

fn map_mcp_error(e: McpError) -> ServiceError {
    match e {
        McpError::AlreadyRunning(name) => {
            ServiceError::already_exists(format!("MCP server already exists: {}", name))
        }
        McpError::NotRunning(name) | McpError::ServerNotFound(name) => {
            ServiceError::not_found(format!("MCP server not found: {}", name))
        }
        McpError::InvalidConfig(msg) => ServiceError::invalid_argument(msg),
        McpError::Timeout(msg) => ServiceError::unavailable(msg),
        other => ServiceError::internal(other.to_string()),
    }
}

async fn manager_or_err(state: &Arc<ServerState>) -> Result<Arc<McpManager>, ServiceError> {
    state
        .mcp_manager()
        .await
        .ok_or_else(|| ServiceError::failed_precondition("MCP manager not configured"))
}

/// The tool index is rebuilt off the request path with a fixed budget.
fn spawn_reindex(manager: Arc<McpManager>) {
    tokio::spawn(async move {
        if tokio::time::timeout(REINDEX_BUDGET, manager.reindex_tools())
            .await
            .is_err()
        {
            log::warn!("MCP tool reindex timed out after {:?}", REINDEX_BUDGET);
        }
    });
}

pub async fn list_servers(state: web::Data<Arc<ServerState>>) -> impl Responder {
    match manager_or_err(state.get_ref()).await {
        Ok(manager) => {
            let mut servers = manager.list_servers();
            servers.sort_by(|a, b| a.name.cmp(&b.name));
            HttpResponse::Ok().json(serde_json::json!({ "servers": servers }))
        }
        Err(e) => error_response(&e),
    }
}

pub async fn add_server(
    state: web::Data<Arc<ServerState>>,
    req: web::Json<McpServerConfig>,
) -> impl Responder {
    let manager = match manager_or_err(state.get_ref()).await {
        Ok(manager) => manager,
        Err(e) => return error_response(&e),
    };
    let config = req.into_inner();
    let name = config.name.clone();
    match manager.add_server(config).await {
        Ok(()) => {
            spawn_reindex(manager);
            HttpResponse::Ok().json(serde_json::json!({ "added": name }))
        }
        Err(e) => error_response(&map_mcp_error(e)),
    }
}

pub async fn delete_server(
    state: web::Data<Arc<ServerState>>,
    path: web::Path<String>,
) -> impl Responder {
    let manager = match manager_or_err(state.get_ref()).await {
        Ok(manager) => manager,
        Err(e) => return error_response(&e),
    };
    let name = path.into_inner();
    match manager.remove_server(&name).await {
        Ok(()) => {
            spawn_reindex(manager);
            HttpResponse::Ok().json(serde_json::json!({ "removed": name }))
        }
        Err(e) => error_response(&map_mcp_error(e)),
    }
}

pub async fn server_tools(
    state: web::Data<Arc<ServerState>>,
    path: web::Path<String>,
) -> impl Responder {
    let manager = match manager_or_err(state.get_ref()).await {
        Ok(manager) => manager,
        Err(e) => return error_response(&e),
    };
    match manager.list_tools(&path.into_inner()).await {
        Ok(tools) => HttpResponse::Ok().json(serde_json::json!({ "tools": tools })),
        Err(e) => error_response(&map_mcp_error(e)),
    }
}

/// Per-server health map; failures are entries, not errors.
pub async fn health(state: web::Data<Arc<ServerState>>) -> impl Responder {
    match manager_or_err(state.get_ref()).await {
        Ok(manager) => {
            let health = manager.health_check().await;
            HttpResponse::Ok().json(serde_json::json!({ "servers": health }))
        }
        Err(e) => error_response(&e),
    }
}
