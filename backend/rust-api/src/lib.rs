use std::sync::Arc;

use axum::{
    http::{header, Method},
    middleware,
    routing::{delete, get},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod extractors;
pub mod handlers;
pub mod kv;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        // Public endpoints
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        // Protected endpoints (require JWT)
        .nest(
            "/api/v1/users/{user_id}",
            user_routes()
                .layer(middleware::from_fn_with_state(
                    app_state.clone(),
                    middlewares::auth::auth_middleware,
                ))
                .layer(cors),
        )
        .with_state(app_state)
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::request_id_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn user_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/attempts",
            get(handlers::attempts::list_attempts).post(handlers::attempts::create_attempt),
        )
        .route(
            "/attempts/recent",
            get(handlers::attempts::list_recent_attempts),
        )
        .route(
            "/attempts/{attempt_id}",
            get(handlers::attempts::get_attempt),
        )
        .route(
            "/questions/{question_id}/attempts",
            get(handlers::attempts::list_question_attempts)
                .delete(handlers::attempts::delete_question_attempts),
        )
        .route(
            "/questions/{question_id}/attempts/{attempt_id}",
            delete(handlers::attempts::delete_attempt),
        )
        .route("/chart", get(handlers::charts::get_attempt_chart))
}
