use std::sync::Arc;

use actix_web::http::header;
use actix_web::{web, HttpResponse, Responder};

use weave_core::ServiceError;

use crate::apps::{validate_app_name, AppSpec, APP_CSP};
use crate::collaborators::AppProvider;
use crate::handlers::error_response;
use crate::state::ServerState;

async fn provider_or_err(
    state: &Arc<ServerState>,
) -> Result<Arc<dyn AppProvider>, ServiceError> {
    state
        .app_provider()
        .await
        .ok_or_else(|| ServiceError::failed_precondition("app provider not configured"))
}

fn html_response(body: String) -> HttpResponse {
    HttpResponse::Ok()
        .append_header((header::CONTENT_TYPE, "text/html; charset=utf-8"))
        .append_header(("X-Content-Type-Options", "nosniff"))
        .append_header(("X-Frame-Options", "SAMEORIGIN"))
        .append_header((header::CONTENT_SECURITY_POLICY, APP_CSP))
        .body(body)
}

/// `GET /apps/` — a plain index of the published apps.
pub async fn index(state: web::Data<Arc<ServerState>>) -> impl Responder {
    let provider = match provider_or_err(state.get_ref()).await {
        Ok(provider) => provider,
        Err(e) => return error_response(&e),
    };
    let infos = provider.list_app_info().await;
    let mut body = String::from("<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>Apps</title></head><body>\n<h1>Apps</h1>\n<ul>\n");
    for info in infos {
        body.push_str(&format!(
            "<li><a href=\"{}\">{}</a></li>\n",
            info.uri, info.display_name
        ));
    }
    body.push_str("</ul>\n</body></html>\n");
    html_response(body)
}

/// `GET /apps/{name}` — the app HTML with the fixed security headers.
pub async fn serve(
    state: web::Data<Arc<ServerState>>,
    path: web::Path<String>,
) -> impl Responder {
    let name = path.into_inner();
    if let Err(e) = validate_app_name(&name) {
        return error_response(&e);
    }
    let provider = match provider_or_err(state.get_ref()).await {
        Ok(provider) => provider,
        Err(e) => return error_response(&e),
    };
    match provider.get_app_html(&name).await {
        Some(html) => html_response(html),
        None => error_response(&ServiceError::not_found(format!("app not found: {}", name))),
    }
}

pub async fn list(state: web::Data<Arc<ServerState>>) -> impl Responder {
    match provider_or_err(state.get_ref()).await {
        Ok(provider) => {
            let apps = provider.list_app_info().await;
            HttpResponse::Ok().json(serde_json::json!({ "apps": apps }))
        }
        Err(e) => error_response(&e),
    }
}

pub async fn create(
    state: web::Data<Arc<ServerState>>,
    req: web::Json<AppSpec>,
) -> impl Responder {
    let provider = match provider_or_err(state.get_ref()).await {
        Ok(provider) => provider,
        Err(e) => return error_response(&e),
    };
    match provider.create_app(req.into_inner()).await {
        Ok(info) => HttpResponse::Ok().json(info),
        Err(e) => error_response(&e),
    }
}

pub async fn update(
    state: web::Data<Arc<ServerState>>,
    path: web::Path<String>,
    req: web::Json<AppSpec>,
) -> impl Responder {
    let provider = match provider_or_err(state.get_ref()).await {
        Ok(provider) => provider,
        Err(e) => return error_response(&e),
    };
    match provider.update_app(&path.into_inner(), req.into_inner()).await {
        Ok(info) => HttpResponse::Ok().json(info),
        Err(e) => error_response(&e),
    }
}

pub async fn delete(
    state: web::Data<Arc<ServerState>>,
    path: web::Path<String>,
) -> impl Responder {
    let provider = match provider_or_err(state.get_ref()).await {
        Ok(provider) => provider,
        Err(e) => return error_response(&e),
    };
    let name = path.into_inner();
    match provider.delete_app(&name).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "deleted": name })),
        Err(e) => error_response(&e),
    }
}

pub async fn component_types(state: web::Data<Arc<ServerState>>) -> impl Responder {
    match provider_or_err(state.get_ref()).await {
        Ok(provider) => {
            let types = provider.list_component_types().await;
            HttpResponse::Ok().json(serde_json::json!({ "component_types": types }))
        }
        Err(e) => error_response(&e),
    }
}
