pub mod admin;
pub mod agents;
pub mod apps;
pub mod health;
pub mod hitl;
pub mod judges;
pub mod mcp;
pub mod patterns;
pub mod stream;
pub mod traces;
pub mod weave;

use actix_web::http::StatusCode;
use actix_web::HttpResponse;

use weave_core::{RpcCode, ServiceError};

/// Render a service error as `{"code": ..., "error": ...}` with the status
/// the code maps to.
pub fn error_response(err: &ServiceError) -> HttpResponse {
    let status = match err.code {
        RpcCode::InvalidArgument => StatusCode::BAD_REQUEST,
        RpcCode::NotFound => StatusCode::NOT_FOUND,
        RpcCode::AlreadyExists => StatusCode::CONFLICT,
        RpcCode::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
        RpcCode::Unauthenticated => StatusCode::UNAUTHORIZED,
        RpcCode::PermissionDenied => StatusCode::FORBIDDEN,
        RpcCode::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        RpcCode::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        RpcCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        RpcCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        RpcCode::Unimplemented => StatusCode::NOT_IMPLEMENTED,
    };
    HttpResponse::build(status).json(serde_json::json!({
        "code": err.code.as_str(),
        "error": err.message,
    }))
}
