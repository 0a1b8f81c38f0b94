//! Recorder endpoints
//!
//! All three are fire-and-forget from the caller's point of view: they
//! answer `202 Accepted` and never report storage failures.

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use std::net::SocketAddr;
use std::sync::Arc;

use super::handlers::{api_error, ApiError, AppState};
use crate::analytics::{extract_client_ip, NavigationContext};
use crate::models::{DeviceInfo, RecordVisitRequest, RecordVisitResponse, VisitId};

/// Record a navigation
pub async fn record_visit(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<RecordVisitRequest>,
) -> Result<(StatusCode, Json<RecordVisitResponse>), ApiError> {
    let path = payload.path.trim();
    if path.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "path cannot be empty"));
    }

    let device = payload
        .device_info
        .map(DeviceInfo::from_value)
        .unwrap_or_default()
        .complete_from_headers(
            header_str(&headers, header::USER_AGENT),
            header_str(&headers, header::ACCEPT_LANGUAGE),
        );

    let nav = NavigationContext {
        path: path.to_string(),
        user_email: payload.user_email,
        device,
        origin_ip: extract_client_ip(&headers, Some(addr.ip()), &state.proxy),
    };

    let id = state.recorder.record_navigation(nav);
    Ok((StatusCode::ACCEPTED, Json(RecordVisitResponse { id })))
}

/// Page-leave signal; the end time is written after the configured delay
pub async fn leave_visit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> StatusCode {
    state.recorder.page_leave(VisitId::from(id)).await;
    StatusCode::ACCEPTED
}

/// Cancel any pending leave and write the end time now
pub async fn end_visit(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> StatusCode {
    state.recorder.unmount(&VisitId::from(id)).await;
    StatusCode::ACCEPTED
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
