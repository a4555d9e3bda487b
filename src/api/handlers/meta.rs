use crate::api::models::{LimitsResponse, StatusResponse};
use crate::ws::AppState;
use axum::{extract::State, response::Json};
use std::sync::Arc;

pub async fn get_limits(State(state): State<Arc<AppState>>) -> Json<LimitsResponse> {
    Json(LimitsResponse::from(&state.limits))
}

/// Collector health plus the number of connected live viewers.
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let collector = state.collector_status.borrow().clone();
    Json(StatusResponse {
        collector,
        subscribers: state.broadcaster.subscriber_count(),
    })
}
