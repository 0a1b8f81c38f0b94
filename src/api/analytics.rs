//! Metrics and visit log handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use super::handlers::{api_error, ApiError, AppState};
use crate::analytics::DerivedMetrics;
use crate::pagination::{PageRequest, PagedResult};

#[derive(Debug, Deserialize)]
pub struct MetricsQueryParams {
    /// Keep only the largest `top` entries of each distribution
    pub top: Option<usize>,
}

/// Dashboard metrics from the authoritative source
pub async fn get_metrics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MetricsQueryParams>,
) -> Result<Json<DerivedMetrics>, ApiError> {
    match state.aggregator.get_metrics(params.top).await {
        Ok(metrics) => Ok(Json(metrics)),
        Err(e) => {
            tracing::error!("Failed to get metrics: {}", e);
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to retrieve metrics: {}", e),
            ))
        }
    }
}

/// One page of the raw visit log
pub async fn list_visits(
    State(state): State<Arc<AppState>>,
    Query(request): Query<PageRequest>,
) -> Result<Json<PagedResult>, ApiError> {
    match state.paginator.get_page(request).await {
        Ok(page) => Ok(Json(page)),
        Err(e) => {
            tracing::error!("Failed to list visits: {}", e);
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to list visits: {}", e),
            ))
        }
    }
}
