use std::sync::Arc;

use axum::{middleware as axum_middleware, routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod authz;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod validation;

use error::AppError;
use services::featured::FeaturedCache;

#[derive(Clone)]
pub struct AppState {
    pub db: db::Database,
    pub config: config::Config,
    pub featured: Arc<FeaturedCache>,
}

impl AppState {
    pub fn new(db: db::Database, config: config::Config) -> Self {
        let featured = Arc::new(FeaturedCache::new(config.featured_cache_ttl));
        Self {
            db,
            config,
            featured,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    // Every API request may carry a token; handlers decide whether it is required
    let api_router = Router::new()
        .nest("/auth", routes::auth::router())
        .nest("/projects", routes::projects::router())
        .nest("/comments", routes::comments::router())
        .nest("/users", routes::users::router())
        .nest("/admin", routes::admin::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_router)
        .fallback(not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn health_check() -> &'static str {
    "OK"
}

async fn not_found() -> AppError {
    AppError::NotFound("Not found".to_string())
}
