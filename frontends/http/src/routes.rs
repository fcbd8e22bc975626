use crate::handlers::{self, SharedEngine};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Builds the router exposing §6's external interfaces, plus the
/// `localhost` branch of the remote contracts (`/blocks`, `/blockparents`,
/// `/datasetparents`, `/blockdump`) that C1 hits when migrating into this
/// instance.
pub fn build_router(engine: SharedEngine) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/dbs/submit", post(handlers::submit))
        .route("/dbs/process", post(handlers::process))
        .route("/dbs/status", get(handlers::status))
        .route("/dbs/remove", post(handlers::remove))
        .route("/dbs/total", get(handlers::total))
        .route("/blocks", get(handlers::blocks))
        .route("/blockparents", get(handlers::block_parents))
        .route("/datasetparents", get(handlers::dataset_parents))
        .route("/blockdump", get(handlers::blockdump))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}
