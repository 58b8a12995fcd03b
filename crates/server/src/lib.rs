use axum::{middleware as axum_middleware, routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub db: db::Database,
    pub config: config::Config,
}

/// Assemble the full application router. `/users` is the signup surface and
/// carries no identity header; everything else requires `X-Sharer-User-Id`.
pub fn app(state: AppState) -> Router {
    let protected_routes = Router::new()
        .nest("/items", routes::items::router())
        .nest("/bookings", routes::bookings::router())
        .nest("/requests", routes::requests::router())
        .route_layer(axum_middleware::from_fn(
            middleware::auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .nest("/users", routes::users::router())
        .merge(protected_routes)
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
