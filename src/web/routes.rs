use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

// REST API for the question-to-SQL pipeline
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/api",
        Router::new()
            .route("/generate", post(handlers::api::generate))
            .route("/execute", post(handlers::api::execute))
            .route("/schema", get(handlers::api::get_schema))
            .route("/health", get(handlers::api::health)),
    )
}
