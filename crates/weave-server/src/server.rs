use std::io;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};

use crate::handlers;
use crate::middleware::IdentityMiddleware;
use crate::state::ServerState;

pub async fn run_server(state: Arc<ServerState>, port: u16) -> io::Result<()> {
    let data = web::Data::new(state.clone());
    let require_user_id = state.config().require_user_id;
    let default_user_id = state.config().default_user_id.clone();

    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(Cors::permissive())
            .service(
                web::scope("/api/v1")
                    .wrap(IdentityMiddleware::new(
                        require_user_id,
                        default_user_id.clone(),
                    ))
                    .route("/weave", web::post().to(handlers::weave::handler))
                    .route("/weave/stream", web::post().to(handlers::stream::handler))
                    .route("/agents", web::post().to(handlers::agents::create))
                    .route("/agents", web::get().to(handlers::agents::list))
                    .route("/agents/{id}", web::get().to(handlers::agents::get))
                    .route("/agents/{id}", web::delete().to(handlers::agents::delete))
                    .route(
                        "/agents/{id}/start",
                        web::post().to(handlers::agents::start),
                    )
                    .route("/agents/{id}/stop", web::post().to(handlers::agents::stop))
                    .route(
                        "/agents/{id}/reload",
                        web::post().to(handlers::agents::reload),
                    )
                    .route(
                        "/permissions/request",
                        web::post().to(handlers::hitl::request_permission),
                    )
                    .route(
                        "/permissions/{id}/answer",
                        web::post().to(handlers::hitl::grant_permission),
                    )
                    .route(
                        "/clarifications/request",
                        web::post().to(handlers::hitl::request_clarification),
                    )
                    .route(
                        "/clarifications/{id}/answer",
                        web::post().to(handlers::hitl::answer_clarification),
                    )
                    .route("/judges", web::post().to(handlers::judges::register))
                    .route("/judges", web::get().to(handlers::judges::list))
                    .route(
                        "/judges/evaluate",
                        web::post().to(handlers::judges::evaluate),
                    )
                    .route(
                        "/judges/evaluate/stream",
                        web::post().to(handlers::judges::evaluate_stream),
                    )
                    .route("/traces/{id}", web::get().to(handlers::traces::get))
                    .route("/patterns", web::get().to(handlers::patterns::list))
                    .route(
                        "/patterns/load",
                        web::post().to(handlers::patterns::load),
                    )
                    .route("/patterns/{name}", web::get().to(handlers::patterns::get))
                    .route(
                        "/apps/component-types",
                        web::get().to(handlers::apps::component_types),
                    )
                    .route("/apps", web::get().to(handlers::apps::list))
                    .route("/apps", web::post().to(handlers::apps::create))
                    .route("/apps/{name}", web::put().to(handlers::apps::update))
                    .route("/apps/{name}", web::delete().to(handlers::apps::delete))
                    .route("/health", web::get().to(handlers::health::handler))
                    .service(
                        web::scope("/admin")
                            .route(
                                "/sessions",
                                web::get().to(handlers::admin::list_all_sessions),
                            )
                            .route("/agents", web::get().to(handlers::admin::list_all_agents)),
                    )
                    .service(
                        web::scope("/mcp")
                            .route("/servers", web::get().to(handlers::mcp::list_servers))
                            .route("/servers", web::post().to(handlers::mcp::add_server))
                            .route(
                                "/servers/{name}",
                                web::delete().to(handlers::mcp::delete_server),
                            )
                            .route(
                                "/servers/{name}/tools",
                                web::get().to(handlers::mcp::server_tools),
                            )
                            .route("/health", web::get().to(handlers::mcp::health)),
                    ),
            )
            // UI-app HTML surface; GET only by construction
            .route("/apps/", web::get().to(handlers::apps::index))
            .route("/apps/{name}", web::get().to(handlers::apps::serve))
    })
    .bind(format!("0.0.0.0:{}", port))?
    .run();

    // On ctrl-c, stop hot-reloaders and MCP servers, then drain the HTTP
    // server gracefully.
    let handle = server.handle();
    let shutdown_state = state;
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::info!("Shutdown signal received");
                shutdown_state.shutdown().await;
                handle.stop(true).await;
            }
            Err(e) => log::error!("failed to listen for shutdown signal: {}", e),
        }
    });

    server.await
}
