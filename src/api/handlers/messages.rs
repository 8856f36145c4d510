use axum::{extract::State, Json};
use std::sync::Arc;

use crate::error::Result;
use crate::models::{MessageRequest, PreviewResponse, SendAttempt};

use super::super::state::{AppState, WsEvent};

/// Render and validate without touching the device
pub async fn preview_message(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<PreviewResponse>> {
    let message = state
        .autopilot
        .preview(&request.recipient, &request.template, &request.fields)?;
    Ok(Json(PreviewResponse::from(&message)))
}

/// Send one message and wait for its terminal state
///
/// A failed attempt is still a 200: the outcome lives in the body.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<SendAttempt>> {
    let attempt = state
        .autopilot
        .send_message(
            &request.recipient,
            &request.template,
            &request.fields,
            request.contact_ref,
        )
        .await?;

    state.broadcast(WsEvent::Attempt(attempt.clone()));
    Ok(Json(attempt))
}
