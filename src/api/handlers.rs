use axum::{http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::analytics::{MetricsAggregator, VisitRecorder};
use crate::config::ProxyConfig;
use crate::pagination::Paginator;

pub struct AppState {
    pub recorder: Arc<VisitRecorder>,
    pub aggregator: Arc<MetricsAggregator>,
    pub paginator: Arc<Paginator>,
    pub proxy: ProxyConfig,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Health check endpoint
pub async fn health_check() -> Json<SuccessResponse> {
    Json(SuccessResponse {
        message: "OK".to_string(),
    })
}
