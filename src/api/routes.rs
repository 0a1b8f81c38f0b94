use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::analytics::{get_metrics, list_visits};
use super::handlers::{health_check, AppState};
use super::visits::{end_visit, leave_visit, record_visit};

pub fn create_api_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/visits", post(record_visit).get(list_visits))
        .route("/visits/{id}/leave", post(leave_visit))
        .route("/visits/{id}/end", post(end_visit))
        .route("/metrics", get(get_metrics))
        .with_state(state);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
