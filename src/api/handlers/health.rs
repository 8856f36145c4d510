use axum::{extract::State, Json};
use chrono::Utc;
use std::sync::Arc;

use crate::models::HealthResponse;

use super::super::state::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let device_id = state.autopilot.session().await.map(|s| s.device.id);

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        device_id,
        device_busy: state.autopilot.device_busy().await,
        clients: state.active_connection_count(),
    })
}
