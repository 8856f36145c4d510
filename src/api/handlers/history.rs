use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use crate::error::Result;
use crate::models::{HistoryQuery, HistoryResponse};

use super::super::state::AppState;

const MAX_HISTORY_LIMIT: usize = 500;

/// Most recent records, optionally for one recipient
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>> {
    let limit = query.limit.clamp(1, MAX_HISTORY_LIMIT);

    let records = match query.phone.as_deref() {
        Some(phone) => state.autopilot.history_for_phone(phone, limit)?,
        None => state.autopilot.history(limit)?,
    };
    let total = state.autopilot.history_count()?;

    Ok(Json(HistoryResponse { records, total }))
}
