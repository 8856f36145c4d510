use axum::{extract::State, Json};
use std::sync::Arc;

use crate::device::ConnectionResult;
use crate::error::Result;
use crate::models::{ConnectRequest, DevicesResponse, ScreenshotResponse};

use super::super::state::AppState;

/// List authorized devices
pub async fn list_devices(State(state): State<Arc<AppState>>) -> Result<Json<DevicesResponse>> {
    let devices = state.autopilot.list_devices().await?;
    Ok(Json(DevicesResponse { devices }))
}

/// Open a session on the requested device, or the first one when the body is empty
pub async fn connect_device(
    State(state): State<Arc<AppState>>,
    request: Option<Json<ConnectRequest>>,
) -> Result<Json<ConnectionResult>> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let result = state.autopilot.connect(request.device_id.as_deref()).await?;

    Ok(Json(result))
}

pub async fn screenshot(State(state): State<Arc<AppState>>) -> Result<Json<ScreenshotResponse>> {
    let (device, shot) = state.autopilot.screenshot().await?;
    let size = shot.size();

    Ok(Json(ScreenshotResponse {
        device_id: device.id,
        width: size.width,
        height: size.height,
        image: shot.to_base64(),
    }))
}
