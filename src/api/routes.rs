use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{batch, devices, health, history, messages};
use super::state::AppState;
use super::websocket::ws_handler;

pub fn create_router(state: Arc<AppState>, allowed_origins: &[String]) -> Router {
    // SECURITY: the sidecar drives a real phone, so only configured local origins may call it
    let cors = CorsLayer::new()
        .allow_origin(origin_headers(allowed_origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any);

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Device endpoints
        .route("/devices", get(devices::list_devices))
        .route("/devices/connect", post(devices::connect_device))
        .route("/devices/screenshot", get(devices::screenshot))
        // Message endpoints
        .route("/messages/preview", post(messages::preview_message))
        .route("/messages/send", post(messages::send_message))
        // History
        .route("/history", get(history::get_history))
        // Batch endpoints
        .route("/batch", post(batch::start_batch))
        .route("/batch/:batch_id", get(batch::get_batch))
        .route("/batch/:batch_id/pause", post(batch::pause_batch))
        .route("/batch/:batch_id/resume", post(batch::resume_batch))
        .route("/batch/:batch_id/cancel", post(batch::cancel_batch))
        // WebSocket
        .route("/ws/:client_id", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn origin_headers(origins: &[String]) -> Vec<HeaderValue> {
    origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {:?}", origin);
                None
            }
        })
        .collect()
}
